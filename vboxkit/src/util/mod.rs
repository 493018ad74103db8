//! Small host-side helpers.

mod process;

pub(crate) use process::kill_process_group;
