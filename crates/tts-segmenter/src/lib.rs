//! tts-segmenter: decides when streamed text is ready to be voiced
//!
//! Text arrives from a generation source in arbitrarily small fragments. A
//! [`SegmentBuffer`] accumulates it and hands out [`Segment`]s at sentence,
//! paragraph or pacing-directive boundaries, so that speech synthesis can
//! start long before the full script has been generated.

mod error;
pub use error::{Result, SegmentError};

mod types;
pub use types::{Segment, SegmenterConfig, DEFAULT_DIRECTIVE_PATTERN, DEFAULT_MIN_DIRECTIVE_LEN};

mod directive;
pub use directive::{DirectiveStripper, PacingDirective};

mod segmenter;
pub use segmenter::{SegmentBuffer, Segmenter};
