mod config;
mod error;
mod executor;
mod fetcher;
mod registers;

pub use config::EmulatorConfig;
pub use error::ExecError;
pub use executor::{Executor, State};
pub use fetcher::Fetcher;
pub use registers::RegisterFile;
