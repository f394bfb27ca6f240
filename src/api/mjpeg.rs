use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use opencv::core::{Mat, Vector};
use opencv::imgcodecs;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::slot::FrameSlot;

/// Boundary marker separating stream parts.
const BOUNDARY: &str = "frame";

pub(super) fn encode_jpeg(image: &Mat) -> Option<Vec<u8>> {
    let mut buf = Vector::<u8>::new();
    let params = Vector::<i32>::new();
    imgcodecs::imencode(".jpg", image, &mut buf, &params).ok()?;
    Some(buf.to_vec())
}

/// One `multipart/x-mixed-replace` part around an encoded image.
fn multipart_chunk(jpeg: &[u8]) -> Bytes {
    let head = format!(
        "--{BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        jpeg.len()
    );
    let mut part = Vec::with_capacity(head.len() + jpeg.len() + 2);
    part.extend_from_slice(head.as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    Bytes::from(part)
}

/// Live montage stream. One independent session loop per connected viewer;
/// every iteration fetches the latest snapshot, so a slow viewer sees fewer
/// distinct frames instead of building up a queue.
pub fn stream_response(slot: Arc<FrameSlot>) -> Response {
    let (tx, rx) = mpsc::channel::<Result<Bytes, std::convert::Infallible>>(1);

    tokio::spawn(async move {
        let mut seen = 0u64;
        loop {
            let (image, version) = slot.wait_newer(seen).await;
            seen = version;

            let Some(jpeg) = encode_jpeg(&image) else {
                tracing::debug!("montage encode failed, skipping frame");
                continue;
            };

            if tx.send(Ok(multipart_chunk(&jpeg))).await.is_err() {
                // Viewer went away.
                break;
            }
        }
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/x-mixed-replace; boundary={BOUNDARY}"),
        )
        .header(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
        .body(Body::from_stream(ReceiverStream::new(rx)))
        .expect("static response parts")
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Scalar, CV_8UC3};

    #[test]
    fn chunk_wraps_payload_with_boundary_and_headers() {
        let chunk = multipart_chunk(b"jpegbytes");
        let text = String::from_utf8_lossy(&chunk);
        assert!(text.starts_with("--frame\r\n"));
        assert!(text.contains("Content-Type: image/jpeg\r\n"));
        assert!(text.contains("Content-Length: 9\r\n"));
        assert!(text.ends_with("jpegbytes\r\n"));
    }

    #[test]
    fn encoded_montage_is_a_jpeg() {
        let image =
            Mat::new_rows_cols_with_default(120, 160, CV_8UC3, Scalar::all(64.0)).unwrap();
        let jpeg = encode_jpeg(&image).unwrap();
        assert_eq!(&jpeg[0..2], &[0xFF, 0xD8]);
    }
}
