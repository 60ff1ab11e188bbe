/// Declares a uuid-backed id newtype.
///
/// Ids serialize as plain uuid strings and default to the nil uuid. Ids
/// that must stay stable across recomputation, such as overlay markers
/// rebuilt on every refresh, come from [`derived`](#method.derived) rather
/// than [`unique`](#method.unique).
///
/// ```ignore
/// id_type!(
///     /// Key of a tracked source.
///     SourceId
/// );
/// ```
#[macro_export]
macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone,
            Copy,
            PartialEq,
            Eq,
            Ord,
            PartialOrd,
            Debug,
            Hash,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[repr(transparent)]
        #[serde(transparent)]
        pub struct $name(uuid::Uuid);

        impl $name {
            pub fn unique() -> $name {
                $name(uuid::Uuid::new_v4())
            }

            pub fn nil() -> $name {
                $name(uuid::Uuid::nil())
            }

            pub const fn from_u128(value: u128) -> $name {
                $name(uuid::Uuid::from_u128(value))
            }

            /// Deterministic id mixed from another id and a salt. The same
            /// inputs always give the same id.
            pub fn derived(base: uuid::Uuid, salt: u128) -> $name {
                $name(uuid::Uuid::from_u128(base.as_u128() ^ salt))
            }

            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }

            pub fn as_uuid(&self) -> uuid::Uuid {
                self.0
            }
        }

        impl From<uuid::Uuid> for $name {
            fn from(uuid: uuid::Uuid) -> $name {
                $name(uuid)
            }
        }

        impl std::str::FromStr for $name {
            type Err = anyhow::Error;

            fn from_str(id: &str) -> Result<$name, Self::Err> {
                Ok($name(uuid::Uuid::parse_str(id)?))
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl Default for $name {
            fn default() -> $name {
                $name::nil()
            }
        }
    };
}
