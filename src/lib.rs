pub mod analyzer;
pub mod compaction;
pub mod errors;
pub mod evidence;
pub mod resume;
pub mod state;
pub mod strategy;
pub mod tether_config;
pub mod transforms;
pub mod util;
pub mod validator;
