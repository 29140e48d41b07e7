//! Report file naming
//!
//! Reports are named after the organization, the day the report was generated
//! and the period it covers:
//!
//! ```rust
//! use chrono::NaiveDate;
//! use umbrella_activity_downloader::downloader::ReportPeriod;
//! use umbrella_activity_downloader::output::ReportFileName;
//! use umbrella_activity_downloader::OrganizationId;
//!
//! let org = OrganizationId::parse("8031234").unwrap();
//! let period = ReportPeriod::month(2024, 2).unwrap();
//! let generated = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
//!
//! let name = ReportFileName::new(&org, period, generated);
//! assert_eq!(name.file_name(), "umbrella-8031234-20240310-report-202402.csv");
//! ```

use chrono::NaiveDate;
use std::path::{Path, PathBuf};

use crate::downloader::ReportPeriod;
use crate::identity::OrganizationId;

/// Name of the CSV report for one organization and period
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportFileName {
    org_id: String,
    period: ReportPeriod,
    generated: NaiveDate,
}

impl ReportFileName {
    /// Name for `period`, generated on `generated`
    pub fn new(org_id: &OrganizationId, period: ReportPeriod, generated: NaiveDate) -> Self {
        Self {
            org_id: org_id.as_str().to_string(),
            period,
            generated,
        }
    }

    /// File name without directory
    pub fn file_name(&self) -> String {
        format!(
            "umbrella-{}-{}-report-{}.csv",
            self.org_id,
            self.generated.format("%Y%m%d"),
            self.period.label()
        )
    }

    /// Full path inside `output_dir`
    pub fn path_in(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(self.file_name())
    }
}
