//! Canonical data model for a manga run: chapters, pages, output plan, summary.
//!
//! The catalog parser produces these shapes; the image store and PDF assembler
//! consume them. Page and chapter order always follows site presentation order.

/// One chapter discovered on the manga listing page, in catalog order.
#[derive(Debug, Clone)]
pub struct Chapter {
    /// 1-based position in the catalog.
    pub index: u32,
    pub url: String,
    /// Page images in presentation order. Empty until the chapter page is parsed.
    pub pages: Vec<Page>,
}

/// One page image belonging to a chapter.
#[derive(Debug, Clone)]
pub struct Page {
    /// 1-based position within the chapter. Determines rendering order.
    pub ordinal: u32,
    pub url: String,
}

/// How chapter PDFs are grouped into output files. Exactly one mode per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputPlan {
    /// One PDF per chapter, written straight to the result folder.
    PerChapter,
    /// One PDF per N consecutive chapters, named `<first>-<last>.pdf`.
    JoinEvery(u32),
    /// Everything concatenated into a single PDF.
    OneFile,
}

impl OutputPlan {
    /// Inclusive 1-based chapter ranges for each output batch.
    ///
    /// `JoinEvery(n)` yields `ceil(total / n)` ranges, the last holding the
    /// remainder. `PerChapter` yields one range per chapter; `OneFile` one
    /// range covering everything.
    pub fn batch_ranges(&self, total: u32) -> Vec<(u32, u32)> {
        if total == 0 {
            return Vec::new();
        }
        match *self {
            OutputPlan::PerChapter => (1..=total).map(|i| (i, i)).collect(),
            OutputPlan::OneFile => vec![(1, total)],
            OutputPlan::JoinEvery(n) => {
                let n = n.max(1);
                (1..=total)
                    .step_by(n as usize)
                    .map(|first| (first, (first + n - 1).min(total)))
                    .collect()
            }
        }
    }
}

/// Output file name for a merged batch covering `first..=last`.
pub fn batch_file_name(first: u32, last: u32) -> String {
    format!("{}-{}.pdf", first, last)
}

/// Why a page or chapter was left out of the output.
#[derive(Debug, Clone)]
pub struct SkipRecord {
    pub chapter: u32,
    /// None when the whole chapter was skipped.
    pub page: Option<u32>,
    pub reason: String,
}

impl std::fmt::Display for SkipRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.page {
            Some(p) => write!(f, "chapter {} page {}: {}", self.chapter, p, self.reason),
            None => write!(f, "chapter {}: {}", self.chapter, self.reason),
        }
    }
}

/// End-of-run report: totals plus everything that was skipped.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub chapters: u32,
    pub pages: u32,
    pub skipped: Vec<SkipRecord>,
}

impl RunSummary {
    pub fn is_partial(&self) -> bool {
        !self.skipped.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_ranges_per_chapter() {
        let plan = OutputPlan::PerChapter;
        assert_eq!(plan.batch_ranges(3), vec![(1, 1), (2, 2), (3, 3)]);
        assert_eq!(plan.batch_ranges(0), Vec::<(u32, u32)>::new());
    }

    #[test]
    fn batch_ranges_one_file() {
        assert_eq!(OutputPlan::OneFile.batch_ranges(7), vec![(1, 7)]);
        assert_eq!(OutputPlan::OneFile.batch_ranges(1), vec![(1, 1)]);
    }

    #[test]
    fn batch_ranges_join_every_divides_evenly() {
        assert_eq!(
            OutputPlan::JoinEvery(2).batch_ranges(4),
            vec![(1, 2), (3, 4)]
        );
    }

    #[test]
    fn batch_ranges_join_every_with_remainder() {
        // ceil(total / n) batches, last one holds the remainder.
        assert_eq!(
            OutputPlan::JoinEvery(10).batch_ranges(12),
            vec![(1, 10), (11, 12)]
        );
        assert_eq!(
            OutputPlan::JoinEvery(2).batch_ranges(3),
            vec![(1, 2), (3, 3)]
        );
    }

    #[test]
    fn batch_ranges_join_every_larger_than_total() {
        assert_eq!(OutputPlan::JoinEvery(50).batch_ranges(3), vec![(1, 3)]);
    }

    #[test]
    fn batch_ranges_join_every_one() {
        assert_eq!(
            OutputPlan::JoinEvery(1).batch_ranges(3),
            vec![(1, 1), (2, 2), (3, 3)]
        );
    }

    #[test]
    fn batch_file_name_formats_range() {
        assert_eq!(batch_file_name(1, 10), "1-10.pdf");
        assert_eq!(batch_file_name(3, 3), "3-3.pdf");
    }

    #[test]
    fn skip_record_display() {
        let page = SkipRecord {
            chapter: 2,
            page: Some(5),
            reason: "HTTP 404".to_string(),
        };
        assert_eq!(page.to_string(), "chapter 2 page 5: HTTP 404");
        let chapter = SkipRecord {
            chapter: 7,
            page: None,
            reason: "no images found".to_string(),
        };
        assert_eq!(chapter.to_string(), "chapter 7: no images found");
    }

    #[test]
    fn run_summary_partial_flag() {
        let mut summary = RunSummary::default();
        assert!(!summary.is_partial());
        summary.skipped.push(SkipRecord {
            chapter: 1,
            page: Some(1),
            reason: "x".to_string(),
        });
        assert!(summary.is_partial());
    }
}
