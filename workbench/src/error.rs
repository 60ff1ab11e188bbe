use common::file_format::FileExtensionError;
use thiserror::Error;

use crate::layout::{LayoutItemId, ViewerId};
use crate::sources::SourceId;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MergeError {
    #[error("At least two sources must be selected when merging")]
    TooFewSources,
    #[error("Source {0} does not exist")]
    UnknownSource(SourceId),
    #[error("All sources must have the same position type when merging")]
    MixedPositionTypes,
    #[error("All sources must have an epoch when merging")]
    MissingEpoch,
    #[error("All source epochs must be unique when merging")]
    DuplicateEpochs,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LayoutError {
    #[error("Viewer {0} does not exist")]
    UnknownViewer(ViewerId),
    #[error("Layout item {0} does not exist")]
    UnknownItem(LayoutItemId),
    #[error("Viewer {0} is not placed in any panel")]
    OrphanViewer(ViewerId),
    #[error("Layout item {0} has no parent container")]
    OrphanItem(LayoutItemId),
    #[error("Layout item {item_id} is listed by {parents} parents")]
    SharedItem { item_id: LayoutItemId, parents: usize },
    #[error("Container {0} has fewer than two children")]
    UncollapsedContainer(LayoutItemId),
    #[error("The root container cannot be removed")]
    RootNotRemovable,
    #[error("Panel {0} holds a single viewer and cannot be split")]
    SingleViewerPanel(LayoutItemId),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unsupported config file: {0}")]
    Format(#[from] FileExtensionError),
    #[error("Failed to parse config: {0}")]
    Parse(String),
}

#[derive(Debug, Error)]
pub enum WorkbenchError {
    #[error(transparent)]
    Merge(#[from] MergeError),
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Workbench runtime has stopped")]
    RuntimeStopped,
}

pub type Result<T> = std::result::Result<T, WorkbenchError>;
