//! Detect a document in a photo and save the rectified page.
//!
//! Usage:
//!   rectify_document <image_path>            # default parameters
//!   rectify_document --config <config.json>  # `DocumentDetectConfig` JSON
//!
//! Set `DOCSCAN_LOG=debug` to follow the pipeline stages.

use docscan::detect::{dynamic_from_image_buffer, image_buffer_from_dynamic};
use docscan::detector::{DocumentDetectConfig, DocumentDetectReport};
use image::ImageReader;
use std::path::{Path, PathBuf};

#[cfg(feature = "tracing")]
use docscan::core::init_tracing;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(feature = "tracing")]
    init_tracing(false);
    #[cfg(not(feature = "tracing"))]
    docscan::core::init_from_env(log::LevelFilter::Info)?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (cfg, cfg_path) = match args.as_slice() {
        [flag, path] if flag == "--config" => {
            (DocumentDetectConfig::load_json(path)?, PathBuf::from(path))
        }
        [image_path] => (
            serde_json::from_value(serde_json::json!({ "image_path": image_path }))?,
            PathBuf::new(),
        ),
        _ => {
            eprintln!("Usage: rectify_document <image_path> | --config <config.json>");
            return Ok(());
        }
    };

    let img = ImageReader::open(Path::new(&cfg.image_path))?.decode()?;
    let buf = image_buffer_from_dynamic(&img)?;
    let mut report =
        DocumentDetectReport::new(&cfg, &cfg_path, buf.width(), buf.height(), buf.channels());

    match cfg.build_detector().detect_and_rectify(buf) {
        Ok(result) => {
            report.set_result(&result);
            let out = dynamic_from_image_buffer(result.into_image())?;
            out.save(cfg.rectified_path())?;
            log::info!(
                "wrote {} ({}x{}, detected: {})",
                cfg.rectified_path().display(),
                out.width(),
                out.height(),
                report.detected
            );
        }
        Err(err) => {
            log::warn!("detection failed: {err}");
            report.set_error(&err);
        }
    }

    report.write_json(cfg.output_path())?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
