//! Distinct address extraction.
//!
//! Every record contributes one address and many records share one. Only
//! distinct addresses are sent to the geocoder; records are matched back to
//! their result later by exact string equality.

use std::collections::BTreeSet;

use cville_crime_models::CrimeRecord;

/// Returns each distinct value of `addresses` once, in order of first
/// appearance.
#[must_use]
pub fn distinct<'a>(addresses: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    addresses
        .into_iter()
        .filter(|address| seen.insert(*address))
        .map(String::from)
        .collect()
}

/// Returns the distinct addresses of `records`.
#[must_use]
pub fn distinct_addresses(records: &[CrimeRecord]) -> Vec<String> {
    let addresses = distinct(records.iter().map(|r| r.address.as_str()));
    log::info!(
        "{} records share {} distinct addresses",
        records.len(),
        addresses.len()
    );
    addresses
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_first_appearance_order() {
        let input = [
            "200 PARK ST Charlottesville VA",
            "100 MAIN ST Charlottesville VA",
            "200 PARK ST Charlottesville VA",
            "100 MAIN ST Charlottesville VA",
            "300 WATER ST Charlottesville VA",
        ];
        assert_eq!(
            distinct(input),
            vec![
                "200 PARK ST Charlottesville VA",
                "100 MAIN ST Charlottesville VA",
                "300 WATER ST Charlottesville VA",
            ]
        );
    }

    #[test]
    fn output_is_a_repeat_free_subset_of_the_input() {
        let input = ["a", "b", "a", "c", "b", "b", "", ""];
        let output = distinct(input);

        assert!(output.len() <= input.len());
        let unique: BTreeSet<&String> = output.iter().collect();
        assert_eq!(unique.len(), output.len());
        assert!(output.iter().all(|a| input.contains(&a.as_str())));
        assert_eq!(output.len(), 4);
    }

    #[test]
    fn empty_input() {
        assert!(distinct(std::iter::empty()).is_empty());
    }

    #[test]
    fn matching_is_exact() {
        let output = distinct(["100 MAIN ST", "100  MAIN ST", "100 main st"]);
        assert_eq!(output.len(), 3);
    }
}
