pub mod api;
mod cli;
pub mod config;
pub mod error;
pub mod forms;
mod server;
pub mod telemetry;
pub mod transport;
pub mod walkthrough;

use error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
