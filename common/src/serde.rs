use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::file_format::FileFormat;

pub type Result<T> = anyhow::Result<T>;

pub fn is_false(value: &bool) -> bool {
    !*value
}

pub fn serialize<T: Serialize>(value: &T, format: FileFormat) -> Result<String> {
    let text = match format {
        FileFormat::Yaml => serde_yml::to_string(value)?,
        FileFormat::Json => serde_json::to_string_pretty(value)?,
    };
    Ok(text)
}

/// YAML input needs an owned `'static` target with `serde_yml`.
pub fn deserialize<T: DeserializeOwned + 'static>(serialized: &[u8], format: FileFormat) -> Result<T> {
    let text = std::str::from_utf8(serialized)?;
    match format {
        FileFormat::Yaml => Ok(serde_yml::from_str(text)?),
        FileFormat::Json => Ok(serde_json::from_str(text)?),
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Settings {
        name: String,
        size: u32,
    }

    #[test]
    fn text_formats_read_back() -> anyhow::Result<()> {
        let settings = Settings {
            name: "tiles".to_string(),
            size: 512,
        };

        for format in [FileFormat::Yaml, FileFormat::Json] {
            let text = serialize(&settings, format)?;
            let back: Settings = deserialize(text.as_bytes(), format)?;
            assert_eq!(back, settings);
        }

        Ok(())
    }

    #[test]
    fn invalid_input_is_an_error() {
        let result: Result<Settings> = deserialize(b"{ not json", FileFormat::Json);
        assert!(result.is_err());
    }
}
