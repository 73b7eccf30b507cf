//! Integration tests: drive the flotilla binary against real temp workspaces

mod helpers;

mod test_affected;
mod test_init;
mod test_publish;
