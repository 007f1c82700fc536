//! Forced-price external collaborator contract (§6).
//!
//! The interactive UI that lets an operator pin explicit price levels is out
//! of scope (§1); its only contract with the core is this directory of
//! marker files. The core's job stops at turning that directory into a
//! sorted `Vec<Decimal>` for `pricing::next_orders`.

use std::fs;
use std::path::Path;

use rust_decimal::Decimal;

const FILE_PREFIX: &str = "_balancer_force_";

/// Scan `dir` for files named `_balancer_force_<price>*` and return the
/// parsed prices, sorted ascending. The price is the third underscore-
/// separated field (`_balancer_force_<price>` split on `_` gives
/// `["", "balancer", "force", "<price>", ...]`); anything after the price in
/// the same field-run is ignored, and unparseable or missing entries are
/// skipped rather than failing the whole scan, per §7's "never crash on
/// startup" posture extended to this collaborator's malformed input.
pub fn read_forced_prices(dir: &Path) -> Vec<Decimal> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            log::debug!("forced-price directory {} unreadable: {}", dir.display(), err);
            return Vec::new();
        }
    };

    let mut prices: Vec<Decimal> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name();
            let name = name.to_str()?;
            parse_forced_price(name)
        })
        .collect();

    prices.sort_unstable();
    prices
}

fn parse_forced_price(file_name: &str) -> Option<Decimal> {
    if !file_name.starts_with(FILE_PREFIX) {
        return None;
    }

    file_name.split('_').nth(3)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;
    use std::fs::File;

    #[test]
    fn parses_price_from_third_underscore_field() {
        assert_eq!(parse_forced_price("_balancer_force_540"), Some(dec!(540)));
        assert_eq!(
            parse_forced_price("_balancer_force_540.50"),
            Some(dec!(540.50))
        );
        assert_eq!(parse_forced_price("_balancer_force_540_extra"), Some(dec!(540)));
    }

    #[test]
    fn ignores_unrelated_and_malformed_names() {
        assert_eq!(parse_forced_price("readme.txt"), None);
        assert_eq!(parse_forced_price("_balancer_force_"), None);
        assert_eq!(parse_forced_price("_balancer_force_notanumber"), None);
    }

    #[test]
    fn reads_and_sorts_prices_from_directory() {
        let dir = tempdir();
        File::create(dir.join("_balancer_force_560")).expect("in test");
        File::create(dir.join("_balancer_force_540")).expect("in test");
        File::create(dir.join("not_a_marker")).expect("in test");

        let prices = read_forced_prices(&dir);

        assert_eq!(prices, vec![dec!(540), dec!(560)]);

        fs::remove_dir_all(&dir).expect("in test");
    }

    #[test]
    fn missing_directory_yields_empty_list() {
        let prices = read_forced_prices(Path::new("/nonexistent/forced-price-dir"));
        assert_eq!(prices, Vec::<Decimal>::new());
    }

    fn tempdir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "mmb_forced_price_test_{}",
            uuid::Uuid::new_v4()
        ));
        fs::create_dir_all(&dir).expect("in test");
        dir
    }
}
