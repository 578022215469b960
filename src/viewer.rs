//! Web viewer data contract.
//!
//! The viewer is a separate surface. It receives one self-contained JSON object
//! per frame and draws `imageDataBase64` (a PNG data URL) to a canvas:
//!
//! ```json
//! {"width":640,"height":480,"timestamp":1234,"processingMs":3.2,"imageDataBase64":"data:image/png;base64,..."}
//! ```
//!
//! `ViewerSink` keeps PNG encoding off the processing lane: the lane only copies
//! the edge map into a one-slot channel, and a writer thread encodes and emits
//! JSON lines. When the writer is behind, new results are dropped.

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{GrayImage, ImageFormat};
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Write};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::thread::JoinHandle;

use crate::publish::{Delivery, DisplaySink, OwnedResult, ProcessingResult};

const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// One frame as the web viewer consumes it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerFrame {
    pub width: u32,
    pub height: u32,
    /// Capture time, milliseconds since session start.
    pub timestamp: u64,
    pub processing_ms: f64,
    pub image_data_base64: String,
}

impl ViewerFrame {
    /// Encode a result as a grayscale PNG data URL.
    pub fn encode(result: &ProcessingResult<'_>) -> Result<Self> {
        let image = GrayImage::from_raw(result.width, result.height, result.edge_map.to_vec())
            .ok_or_else(|| {
                anyhow!(
                    "edge map of {} bytes does not fit {}x{}",
                    result.edge_map.len(),
                    result.width,
                    result.height
                )
            })?;
        let mut png = Cursor::new(Vec::new());
        image
            .write_to(&mut png, ImageFormat::Png)
            .context("png encode failed")?;

        let mut data_url = String::from(PNG_DATA_URL_PREFIX);
        STANDARD.encode_string(png.get_ref(), &mut data_url);

        Ok(Self {
            width: result.width,
            height: result.height,
            timestamp: result.timestamp.as_millis(),
            processing_ms: result.processing_ms(),
            image_data_base64: data_url,
        })
    }

    /// Decode the embedded PNG back into a grayscale image.
    pub fn decode_image(&self) -> Result<GrayImage> {
        let payload = self
            .image_data_base64
            .strip_prefix(PNG_DATA_URL_PREFIX)
            .ok_or_else(|| anyhow!("image data is not a PNG data URL"))?;
        let png = STANDARD
            .decode(payload)
            .context("invalid base64 image payload")?;
        let image = image::load_from_memory_with_format(&png, ImageFormat::Png)
            .context("invalid PNG payload")?
            .into_luma8();
        if image.dimensions() != (self.width, self.height) {
            return Err(anyhow!(
                "image is {}x{}, metadata says {}x{}",
                image.width(),
                image.height(),
                self.width,
                self.height
            ));
        }
        Ok(image)
    }
}

// ----------------------------------------------------------------------------
// ViewerSink
// ----------------------------------------------------------------------------

/// Streams `ViewerFrame` JSON lines to a writer on a background thread.
pub struct ViewerSink {
    tx: Option<SyncSender<OwnedResult>>,
    worker: Option<JoinHandle<()>>,
}

impl ViewerSink {
    pub fn spawn<W: Write + Send + 'static>(writer: W) -> Result<Self> {
        let (tx, rx) = mpsc::sync_channel::<OwnedResult>(1);
        let worker = std::thread::Builder::new()
            .name("edge-viewer".into())
            .spawn(move || {
                let mut writer = writer;
                for owned in rx {
                    if let Err(e) = write_frame(&mut writer, &owned) {
                        log::warn!("viewer output stopped: {:#}", e);
                        break;
                    }
                }
            })
            .context("failed to spawn viewer writer thread")?;
        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
        })
    }
}

fn write_frame<W: Write>(writer: &mut W, owned: &OwnedResult) -> Result<()> {
    let frame = ViewerFrame::encode(&owned.as_result())?;
    serde_json::to_writer(&mut *writer, &frame)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

impl DisplaySink for ViewerSink {
    fn name(&self) -> &str {
        "viewer"
    }

    fn on_result(&mut self, result: &ProcessingResult<'_>) -> Result<Delivery> {
        let Some(tx) = self.tx.as_ref() else {
            return Ok(Delivery::Dropped);
        };
        match tx.try_send(result.to_owned_result()) {
            Ok(()) => Ok(Delivery::Delivered),
            Err(TrySendError::Full(_)) => Ok(Delivery::Dropped),
            Err(TrySendError::Disconnected(_)) => {
                // Writer thread exited; stop trying.
                self.tx = None;
                Ok(Delivery::Dropped)
            }
        }
    }
}

impl Drop for ViewerSink {
    fn drop(&mut self) {
        // Closing the channel ends the writer loop after the queued frame.
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("viewer writer thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameTimestamp;
    use crate::pipeline::OutputMode;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn result(bytes: &[u8], width: u32, height: u32) -> ProcessingResult<'_> {
        ProcessingResult {
            edge_map: bytes,
            width,
            height,
            timestamp: FrameTimestamp::from_millis(1500),
            processing: Duration::from_millis(2),
            sequence: 1,
            mode: OutputMode::Edges,
        }
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().expect("buffer lock").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn json_uses_viewer_field_names() -> Result<()> {
        let bytes = [0u8, 255, 255, 0];
        let frame = ViewerFrame::encode(&result(&bytes, 2, 2))?;
        let json = serde_json::to_value(&frame)?;
        assert_eq!(json["width"], 2);
        assert_eq!(json["height"], 2);
        assert_eq!(json["timestamp"], 1500);
        assert!(json["processingMs"].as_f64().is_some());
        let data = json["imageDataBase64"].as_str().expect("image data");
        assert!(data.starts_with("data:image/png;base64,"));
        Ok(())
    }

    #[test]
    fn embedded_png_carries_the_edge_map() -> Result<()> {
        let bytes = [0u8, 255, 255, 0, 0, 255, 255, 0];
        let frame = ViewerFrame::encode(&result(&bytes, 4, 2))?;
        let image = frame.decode_image()?;
        assert_eq!(image.as_raw().as_slice(), &bytes);
        Ok(())
    }

    #[test]
    fn encode_rejects_short_buffer() {
        let bytes = [0u8; 3];
        assert!(ViewerFrame::encode(&result(&bytes, 2, 2)).is_err());
    }

    #[test]
    fn sink_writes_one_json_line_per_frame() -> Result<()> {
        let out = SharedBuf::default();
        let mut sink = ViewerSink::spawn(out.clone())?;
        let bytes = [255u8; 6];
        assert_eq!(sink.on_result(&result(&bytes, 3, 2))?, Delivery::Delivered);
        drop(sink);

        let written = out.0.lock().expect("buffer lock").clone();
        let text = String::from_utf8(written)?;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 1);
        let frame: ViewerFrame = serde_json::from_str(lines[0])?;
        assert_eq!((frame.width, frame.height), (3, 2));
        Ok(())
    }
}
