//! CLI subcommand implementations.

pub mod day;
pub mod edit;
pub mod feed;
pub mod init;
pub mod nappy;
pub mod pair;
pub mod sleep;
pub mod status;
pub mod sync;
pub mod timer;
pub mod util;
pub mod watch;
