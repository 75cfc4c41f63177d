// SPDX-FileCopyrightText: 2025 The superseedr Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::env;
use std::fs;
use std::path::PathBuf;

use clap::Parser;
use tracing_appender::rolling::RollingFileAppender;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::{fmt, prelude::*};

use filesview::cli::{self, Cli};
use filesview::config;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = config::load_settings();

    let base_data_dir = config::get_app_paths()
        .map(|(_, data_dir)| data_dir)
        .unwrap_or_else(|| env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    let log_dir = base_data_dir.join("logs");
    fs::create_dir_all(&log_dir)?;

    let general_log = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(31)
        .filename_prefix("filesview")
        .filename_suffix("log")
        .build(&log_dir)?;
    let (non_blocking_general, _guard_general) = tracing_appender::non_blocking(general_log);

    let filter = Targets::new().with_default(LevelFilter::from(settings.log_level));
    let general_layer = fmt::layer()
        .with_writer(non_blocking_general)
        .with_ansi(false)
        .with_filter(filter);
    let _ = tracing_subscriber::registry().with(general_layer).try_init();

    tracing::info!("STARTING FILESVIEW");

    let args = Cli::parse();
    match cli::run(args, &settings) {
        Ok(output) => {
            print!("{}", output);
            Ok(())
        }
        Err(e) => {
            tracing::error!("{}", e);
            Err(e.into())
        }
    }
}
