mod cli;
mod infra;
mod pages;
mod routes;
mod server;
mod session;
mod views;

use device_wizard::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
