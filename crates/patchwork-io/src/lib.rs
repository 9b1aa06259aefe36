//! patchwork-io: file-backed slides, tile output, and dataset batching.
//!
//! Everything that touches the filesystem lives here; the extraction
//! logic itself is in `patchwork-pipeline`.

pub mod annotation;
pub mod dataset;
pub mod pairing;
pub mod sink;
pub mod slide_file;

pub use annotation::{AnnotationError, LabelMap, MaskJob, convert, convert_all, mask_jobs};
pub use dataset::{DatasetDriver, DatasetError};
pub use pairing::{ANNOTATION_EXTENSIONS, RASTER_EXTENSIONS, SlideJob, discover, file_stem, pair};
pub use sink::DirectorySink;
pub use slide_file::{decode_rgba, load_heatmap, open_mask, open_slide};
