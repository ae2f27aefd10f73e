//! Migration CLI
//!
//! Reads `DATABASE_URL` from the environment (or `.env`) and accepts the
//! usual sea-orm-migration subcommands: `up`, `down`, `status`, `fresh`.

use sea_orm_migration::prelude::*;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    cli::run_cli(pledgehub_migration::Migrator).await;
}
