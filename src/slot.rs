use std::sync::Mutex;

use opencv::core::Mat;
use opencv::prelude::*;
use tokio::sync::Notify;

/// Latest-montage hand-off between the ingestion thread and viewer sessions.
///
/// Single writer, many readers. Readers always copy out under the lock, so a
/// later publish can never touch pixels a reader is still encoding. The
/// version counter only ever grows; viewers use it to wait for fresh frames
/// without spinning.
pub struct FrameSlot {
    latest: Mutex<Inner>,
    changed: Notify,
}

struct Inner {
    image: Option<Mat>,
    version: u64,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self {
            latest: Mutex::new(Inner {
                image: None,
                version: 0,
            }),
            changed: Notify::new(),
        }
    }

    /// Replace the held image wholesale and wake waiting viewers.
    pub fn publish(&self, image: Mat) {
        {
            let mut inner = self.latest.lock().unwrap();
            inner.image = Some(image);
            inner.version += 1;
        }
        self.changed.notify_waiters();
    }

    /// Copy of the current image, or `None` before the first publish.
    pub fn snapshot(&self) -> Option<Mat> {
        let inner = self.latest.lock().unwrap();
        inner.image.as_ref().and_then(|image| image.try_clone().ok())
    }

    /// Wait until the slot holds something newer than `seen`, then copy it out.
    pub async fn wait_newer(&self, seen: u64) -> (Mat, u64) {
        loop {
            let pending = self.changed.notified();
            {
                let inner = self.latest.lock().unwrap();
                if inner.version > seen {
                    if let Some(copy) =
                        inner.image.as_ref().and_then(|image| image.try_clone().ok())
                    {
                        return (copy, inner.version);
                    }
                }
            }
            pending.await;
        }
    }
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use opencv::core::{Scalar, CV_8UC3};

    fn solid(value: f64) -> Mat {
        Mat::new_rows_cols_with_default(120, 160, CV_8UC3, Scalar::all(value)).unwrap()
    }

    fn assert_uniform(image: &Mat) -> u8 {
        let bytes = image.data_bytes().unwrap();
        let first = bytes[0];
        assert!(bytes.iter().all(|&b| b == first), "mixed-pixel snapshot");
        first
    }

    #[test]
    fn empty_slot_is_not_ready() {
        let slot = FrameSlot::new();
        assert!(slot.snapshot().is_none());
    }

    #[test]
    fn snapshot_is_an_independent_copy() {
        let slot = FrameSlot::new();
        slot.publish(solid(0.0));
        let copy = slot.snapshot().unwrap();
        slot.publish(solid(255.0));
        assert_eq!(assert_uniform(&copy), 0);
    }

    #[test]
    fn concurrent_reads_never_observe_a_torn_write() {
        let slot = Arc::new(FrameSlot::new());
        let writer = {
            let slot = Arc::clone(&slot);
            std::thread::spawn(move || {
                for i in 0..200 {
                    let value = if i % 2 == 0 { 0.0 } else { 255.0 };
                    slot.publish(solid(value));
                }
            })
        };

        let mut sampled = 0;
        while !writer.is_finished() || sampled == 0 {
            if let Some(image) = slot.snapshot() {
                let value = assert_uniform(&image);
                assert!(value == 0 || value == 255);
                sampled += 1;
            }
        }
        writer.join().unwrap();
        assert!(sampled > 0);
    }

    #[tokio::test]
    async fn waiters_wake_on_publish() {
        let slot = Arc::new(FrameSlot::new());

        let waiter = {
            let slot = Arc::clone(&slot);
            tokio::spawn(async move { slot.wait_newer(0).await.1 })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        slot.publish(solid(7.0));
        assert_eq!(waiter.await.unwrap(), 1);

        // Already-newer content returns without waiting.
        let (image, version) = slot.wait_newer(0).await;
        assert_eq!(version, 1);
        assert_eq!(assert_uniform(&image), 7);
    }
}
