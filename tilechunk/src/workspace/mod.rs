//! Workspace planning and staging.
//!
//! Every input gets a unique key within the workspace. The key names the
//! staged working copy (`{workspace}/{key}-workingcopy.tif`) and the folder
//! its tiles are written under (`{workspace}/{key}`).

mod planner;
mod stager;

pub use planner::{plan_workspace, UriSet, WorkspaceKeyRegistry};
pub use stager::WorkspaceStager;
