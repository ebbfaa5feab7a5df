// PixelPose
// copyright zipxing@hotmail.com 2022～2025

//! Log module provides various log functions, reference
//! https://docs.rs/log4rs

use log::LevelFilter;

#[cfg(feature = "log4rs")]
use log4rs::{
    append::file::FileAppender,
    config::{Appender, Config, Root},
    encode::pattern::PatternEncoder,
    filter::threshold::ThresholdFilter,
};

/// init logs system
#[allow(unused)]
pub fn init_log(level: LevelFilter, file_path: &str) {
    #[cfg(feature = "log4rs")]
    {
        let logfile = FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(
                "{d(%Y-%m-%d %H:%M:%S)} {l} {t} {m}{n}",
            )))
            .build(file_path);
        let logfile = match logfile {
            Ok(f) => f,
            Err(_) => return,
        };
        let config = Config::builder()
            .appender(
                Appender::builder()
                    .filter(Box::new(ThresholdFilter::new(level)))
                    .build("logfile", Box::new(logfile)),
            )
            .build(Root::builder().appender("logfile").build(level));
        if let Ok(config) = config {
            // init fails when a logger is already installed, e.g. in tests
            let _ = log4rs::init_config(config);
        }
    }
}
