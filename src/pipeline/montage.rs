use opencv::core::{Mat, Rect, Scalar, Size, CV_8UC3};
use opencv::imgproc;
use opencv::prelude::*;

/// Fixed-grid tiler over the current set of device frames.
pub struct MontageComposer {
    tile: Size,
    grid_width: usize,
    grid_height: usize,
}

impl MontageComposer {
    pub fn new(tile_width: i32, tile_height: i32, grid_width: usize, grid_height: usize) -> Self {
        Self {
            tile: Size::new(tile_width, tile_height),
            grid_width,
            grid_height,
        }
    }

    pub fn capacity(&self) -> usize {
        self.grid_width * self.grid_height
    }

    /// Compose the frames, in order, into one grid image. Frames beyond grid
    /// capacity get no cell. Returns `None` when there is nothing to show.
    pub fn compose<'a, I>(&self, frames: I) -> opencv::Result<Option<Mat>>
    where
        I: IntoIterator<Item = &'a Mat>,
    {
        let frames: Vec<&Mat> = frames.into_iter().take(self.capacity()).collect();
        if frames.is_empty() {
            return Ok(None);
        }

        let mut canvas = Mat::new_rows_cols_with_default(
            self.tile.height * self.grid_height as i32,
            self.tile.width * self.grid_width as i32,
            CV_8UC3,
            Scalar::all(0.0),
        )?;

        for (i, frame) in frames.into_iter().enumerate() {
            let col = (i % self.grid_width) as i32;
            let row = (i / self.grid_width) as i32;
            let cell = Rect::new(
                col * self.tile.width,
                row * self.tile.height,
                self.tile.width,
                self.tile.height,
            );

            let mut roi = Mat::roi_mut(&mut canvas, cell)?;
            if frame.size()? == self.tile {
                frame.copy_to(&mut roi)?;
            } else {
                let mut resized = Mat::default();
                imgproc::resize(frame, &mut resized, self.tile, 0.0, 0.0, imgproc::INTER_LINEAR)?;
                resized.copy_to(&mut roi)?;
            }
        }

        Ok(Some(canvas))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::Vec3b;

    fn solid(value: f64) -> Mat {
        Mat::new_rows_cols_with_default(300, 400, CV_8UC3, Scalar::all(value)).unwrap()
    }

    #[test]
    fn composes_tiles_in_insertion_order() {
        let composer = MontageComposer::new(400, 300, 2, 1);
        let a = solid(10.0);
        let b = solid(200.0);

        let montage = composer.compose([&a, &b]).unwrap().unwrap();
        assert_eq!(montage.size().unwrap(), Size::new(800, 300));

        let left = *montage.at_2d::<Vec3b>(150, 200).unwrap();
        let right = *montage.at_2d::<Vec3b>(150, 600).unwrap();
        assert_eq!(left[0], 10);
        assert_eq!(right[0], 200);
    }

    #[test]
    fn frames_beyond_grid_capacity_are_omitted() {
        let composer = MontageComposer::new(400, 300, 2, 1);
        let frames = [solid(10.0), solid(200.0), solid(90.0)];

        let montage = composer.compose(frames.iter()).unwrap().unwrap();
        assert_eq!(montage.size().unwrap(), Size::new(800, 300));
        // The first two feeds fill the grid; the third has no cell.
        assert_eq!((*montage.at_2d::<Vec3b>(150, 200).unwrap())[0], 10);
        assert_eq!((*montage.at_2d::<Vec3b>(150, 600).unwrap())[0], 200);
    }

    #[test]
    fn mismatched_frames_are_resized_into_their_cell() {
        let composer = MontageComposer::new(400, 300, 1, 1);
        let tall = Mat::new_rows_cols_with_default(600, 400, CV_8UC3, Scalar::all(50.0)).unwrap();

        let montage = composer.compose([&tall]).unwrap().unwrap();
        assert_eq!(montage.size().unwrap(), Size::new(400, 300));
        assert_eq!((*montage.at_2d::<Vec3b>(150, 200).unwrap())[0], 50);
    }

    #[test]
    fn empty_input_produces_no_montage() {
        let composer = MontageComposer::new(400, 300, 2, 2);
        assert!(composer.compose(std::iter::empty::<&Mat>()).unwrap().is_none());
    }
}
