//! Upload command implementation

use fwup_link::{Connection, UploadOptions, UploadProgress, Uploader};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

/// Progress bar fed by the uploader
struct BarProgress {
    pb: ProgressBar,
}

impl UploadProgress for BarProgress {
    fn start(&mut self, total: u32) {
        self.pb.set_length(total as u64);
        self.pb.set_position(0);
    }

    fn update(&mut self, sent: u32) {
        self.pb.set_position(sent as u64);
    }

    fn finish(&mut self) {
        self.pb.set_message("Waiting for acknowledgement");
    }
}

/// Run the upload command
pub fn run_upload(
    input: &Path,
    conn: &Connection,
    options: UploadOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let image = std::fs::read(input)?;
    println!("Uploading {:?} ({} bytes)", input, image.len());

    let transport = fwup_link::open(conn)?;
    let mut uploader = Uploader::new(transport, options)?;

    let pb = ProgressBar::new(image.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {msg}")?
            .progress_chars("#>-"),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    let mut progress = BarProgress { pb };

    let report = uploader.upload(&image, &mut progress)?;

    if !report.acknowledged {
        progress.pb.abandon_with_message("No acknowledgement");
        return Err(format!(
            "Device did not acknowledge the upload ({} bytes sent)",
            report.bytes_sent
        )
        .into());
    }

    progress.pb.finish_with_message("Done");
    println!(
        "Device acknowledged {} bytes in {:.2}s",
        report.bytes_sent,
        report.elapsed.as_secs_f64()
    );
    Ok(())
}
