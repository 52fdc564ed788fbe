//
// Copyright (c) 2025 The Warden Identity Management Project contributors
//
// This file is part of the Warden Identity Management Project
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

use crate::modules::settings::cli::SETTINGS;

/// Installs the global subscriber. The returned guard flushes the file writer
/// on drop and must live as long as the process logs.
pub fn initialize_logging() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&SETTINGS.warden_log_level));

    let (writer, guard) = if SETTINGS.warden_log_to_file {
        match file_appender() {
            Ok(appender) => {
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);
                (BoxMakeWriter::new(non_blocking), Some(guard))
            }
            Err(e) => {
                eprintln!("Failed to create log file appender, falling back to stdout: {e}");
                (BoxMakeWriter::new(std::io::stdout), None)
            }
        }
    } else {
        (BoxMakeWriter::new(std::io::stdout), None)
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(SETTINGS.warden_ansi_logs && !SETTINGS.warden_log_to_file)
        .with_target(true)
        .with_writer(writer);

    if SETTINGS.warden_json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
    guard
}

fn file_appender() -> Result<RollingFileAppender, tracing_appender::rolling::InitError> {
    let log_dir = PathBuf::from(&SETTINGS.warden_root_dir).join("logs");
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("warden")
        .filename_suffix("log")
        .max_log_files(SETTINGS.warden_max_server_log_files.max(1))
        .build(log_dir)
}
