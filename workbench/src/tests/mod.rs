mod layout_tests;
mod source_tests;
mod sync_tests;

use crate::actions::DataFilesAction;
use crate::config::WorkbenchConfig;
use crate::data_files::{Hdu, HduId};
use crate::store::Workbench;
use crate::testing::library_of;

/// Workbench with `hdus` already in the library.
fn workbench_with(hdus: Vec<Hdu>) -> (Workbench, Vec<HduId>) {
    let ids = hdus.iter().map(|hdu| hdu.id).collect();
    let mut workbench = Workbench::new(WorkbenchConfig::default());
    workbench.dispatch(DataFilesAction::LoadLibrarySuccess(library_of(hdus)));
    (workbench, ids)
}
