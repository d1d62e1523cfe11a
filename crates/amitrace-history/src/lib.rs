//! Image usage history.
//!
//! [`images`] reads the list of tracked images, [`scanner`] walks the
//! repository history recording every diff line that mentions one,
//! [`classify`] turns those occurrences into a final status and [`report`]
//! renders the result.

pub mod classify;
pub mod images;
pub mod report;
pub mod scanner;

pub use classify::{classify_all, classify_image, FsProbe, NoProbe, StatusCounts, WorkingTreeProbe};
pub use images::{parse_image_list, read_image_list};
pub use scanner::{ScanSummary, Scanner};
