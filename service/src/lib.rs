//! Process-level infrastructure shared by the realtime node's binaries:
//! command line / environment configuration and console logging.

pub mod config;
pub mod logging;
