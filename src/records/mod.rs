//! Concrete record types of the raw file format.
//!
//! | Record              | Shape      | Sizes by revision                 |
//! |---------------------|------------|-----------------------------------|
//! | `ScanIndexEntry`    | fixed      | 72 / 80 (64) / 88 (65+)           |
//! | `Reaction`          | fixed      | 24 / 32 (31) / 48 (65) / 56 (66)  |
//! | `ScanEventPreamble` | fixed      | 41 / 80 / 120 / 128 / 132         |
//! | `ScanEvent`         | composite  | preamble + arrays + name          |
//! | `RawFileInfo`       | composite  | preamble + controller tables      |
//! | `SampleInfo`        | fixed      | 88                                |
//! | `RunAddresses`      | fixed      | 56 / 144 (64) / 148 (66)          |
//! | `RunHeader`         | composite  | sample info + addresses + strings |

pub mod file_info;
pub mod reaction;
pub mod run_header;
pub mod scan_event;
pub mod scan_index;

pub use file_info::{
    encode_file_info, AcquisitionDate, AcquisitionPreamble, ControllerSlot, RawFileInfo, CONTROLLER_SLOTS,
};
pub use reaction::{Activation, Reaction};
pub use run_header::{encode_run_header, RunAddresses, RunHeader, SampleInfo};
pub use scan_event::{encode_scan_event, Analyzer, MassRange, Polarity, ScanEvent, ScanEventPreamble, ScanMode};
pub use scan_index::ScanIndexEntry;
