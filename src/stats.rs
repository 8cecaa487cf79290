//! Run-summary statistics emitted after a pipeline run.

use std::fmt;

/// Per-table row counts, house link coverage, and parameter coverage.
///
/// The core only reports these figures; alerting on them (e.g. a
/// houses-with-municipality ratio below 95%) is a downstream concern.
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub municipalities: i64,
    pub settlements: i64,
    pub streets: i64,
    pub houses: i64,
    pub land_plots: i64,

    pub houses_with_street: i64,
    pub houses_with_settlement: i64,
    pub houses_with_municipality: i64,

    pub cadastral_numbers: i64,
    pub residents_counts: i64,
    pub floors_counts: i64,

    /// Active OBJECT records whose level routes to no staging table.
    pub skipped_objects: u64,
    /// Records dropped by per-record validation.
    pub data_errors: u64,
}

pub(crate) fn percent(part: i64, total: i64) -> f64 {
    if total > 0 {
        part as f64 / total as f64 * 100.0
    } else {
        0.0
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Municipalities: {}", self.municipalities)?;
        writeln!(f, "Settlements:    {}", self.settlements)?;
        writeln!(f, "Streets:        {}", self.streets)?;
        writeln!(f, "Houses:         {}", self.houses)?;
        writeln!(f, "Land plots:     {}", self.land_plots)?;
        writeln!(f, "House links:")?;
        writeln!(
            f,
            "  street:       {} ({:.1}%)",
            self.houses_with_street,
            percent(self.houses_with_street, self.houses)
        )?;
        writeln!(
            f,
            "  settlement:   {} ({:.1}%)",
            self.houses_with_settlement,
            percent(self.houses_with_settlement, self.houses)
        )?;
        writeln!(
            f,
            "  municipality: {} ({:.1}%)",
            self.houses_with_municipality,
            percent(self.houses_with_municipality, self.houses)
        )?;
        writeln!(f, "House parameters:")?;
        writeln!(
            f,
            "  cadastral numbers: {} ({:.1}%)",
            self.cadastral_numbers,
            percent(self.cadastral_numbers, self.houses)
        )?;
        writeln!(
            f,
            "  residents counts:  {} ({:.1}%)",
            self.residents_counts,
            percent(self.residents_counts, self.houses)
        )?;
        writeln!(
            f,
            "  floors counts:     {} ({:.1}%)",
            self.floors_counts,
            percent(self.floors_counts, self.houses)
        )?;
        writeln!(f, "Skipped objects (other levels): {}", self.skipped_objects)?;
        write!(f, "Dropped records (validation):   {}", self.data_errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentages_tolerate_empty_tables() {
        assert_eq!(percent(0, 0), 0.0);
        assert_eq!(percent(5, 0), 0.0);
        assert!((percent(95, 100) - 95.0).abs() < f64::EPSILON);
    }

    #[test]
    fn display_includes_coverage_lines() {
        let stats = RunStats {
            houses: 200,
            houses_with_municipality: 190,
            ..Default::default()
        };
        let rendered = stats.to_string();
        assert!(rendered.contains("municipality: 190 (95.0%)"));
    }
}
