// SAVE Storage - key-addressed blob storage
// Copyright (C) 2026 SAVE Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published
// by the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.

use clap::Parser;
use save_cli::{output, Cli, StorageContext};
use save_observability::init_tracing_with_config;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.load_config().await {
        Ok(config) => config,
        Err(e) => {
            output::error(&format!("Error: {:#}", e));
            return ExitCode::FAILURE;
        }
    };

    match cli.log_config(&config) {
        Ok(log) => {
            if let Err(e) = init_tracing_with_config(log) {
                output::warning(&format!("Logging disabled: {}", e));
            }
        }
        Err(e) => output::warning(&format!("Logging disabled: {:#}", e)),
    }

    let result = match StorageContext::from_config(&config).await {
        Ok(context) => cli.run(&context).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("Error: {:#}", e));
            ExitCode::FAILURE
        }
    }
}
