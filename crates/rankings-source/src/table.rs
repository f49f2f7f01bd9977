//! Column-position discovery for the scraped rankings table (§4.5).
//!
//! The vendor table has no stable column ordering, and three columns share
//! the label "NetRtg". Positions are discovered once per scrape and then
//! reused for every row.

use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct HeaderIndex {
    pub team: usize,
    pub adj_o: usize,
    pub adj_d: usize,
    pub adj_t: usize,
    pub net_rating: usize,
    pub non_conf_sos: usize,
    pub luck: usize,
    pub conference: Option<usize>,
    pub record: Option<usize>,
}

/// The header row is the first row whose first cell is "Rk" or "Rank".
pub fn find_header_row(rows: &[Vec<String>]) -> Option<usize> {
    rows.iter().position(|row| {
        row.first()
            .map(|c| c.eq_ignore_ascii_case("rk") || c.eq_ignore_ascii_case("rank"))
            .unwrap_or(false)
    })
}

/// Locates every column this component needs by label, resolving the
/// "NetRtg" label collision and the two positional fallbacks documented
/// in §4.5: `AdjD` is two columns after `AdjO` when unlabeled, and `Luck`
/// follows `AdjT` by the same +2 offset.
pub fn resolve_header(header: &[String]) -> Option<HeaderIndex> {
    let team = find_label(header, &["Team", "School"])?;
    let adj_o = find_label(header, &["AdjOE", "AdjO"])?;

    let adj_d = find_label(header, &["AdjDE", "AdjD"]).unwrap_or_else(|| {
        warn!("AdjD not found by label, inferring as AdjO + 2");
        adj_o + 2
    });

    // Three columns share "NetRtg": net rating, adjusted tempo, then
    // non-conference strength of schedule, in that order.
    let net_rtg_positions = find_all_labels(header, "NetRtg");
    let (net_rating, adj_t, non_conf_sos) = if net_rtg_positions.len() >= 3 {
        (net_rtg_positions[0], net_rtg_positions[1], net_rtg_positions[2])
    } else {
        let net_rating = net_rtg_positions.first().copied()?;
        let adj_t = find_label(header, &["AdjT", "AdjTempo", "Tempo"])?;
        let non_conf_sos = find_label(header, &["NCSOS", "NC SOS"]).unwrap_or(adj_t + 1);
        (net_rating, adj_t, non_conf_sos)
    };

    let luck = find_label(header, &["Luck"]).unwrap_or_else(|| {
        warn!("Luck not found by label, inferring as AdjT + 2");
        adj_t + 2
    });

    Some(HeaderIndex {
        team,
        adj_o,
        adj_d,
        adj_t,
        net_rating,
        non_conf_sos,
        luck,
        conference: find_label(header, &["Conf", "Conference"]),
        record: find_label(header, &["WL", "Record", "W-L"]),
    })
}

fn find_label(header: &[String], candidates: &[&str]) -> Option<usize> {
    header.iter().position(|h| candidates.iter().any(|c| h.eq_ignore_ascii_case(c)))
}

fn find_all_labels(header: &[String], label: &str) -> Vec<usize> {
    header
        .iter()
        .enumerate()
        .filter(|(_, h)| h.eq_ignore_ascii_case(label))
        .map(|(i, _)| i)
        .collect()
}

/// Efficiency/rating range validation (§4.5): out-of-range numerics are
/// dropped with a warning rather than trusted.
pub fn validate_efficiency(value: f64, field: &str, team: &str) -> Option<f64> {
    if (70.0..=130.0).contains(&value) {
        Some(value)
    } else {
        warn!("dropping out-of-range {field}={value} for {team}");
        None
    }
}

pub fn validate_luck(value: f64, team: &str) -> Option<f64> {
    if (-0.5..=0.5).contains(&value) {
        Some(value)
    } else {
        warn!("dropping out-of-range luck={value} for {team}");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_row_is_first_rk_row() {
        let rows = vec![
            vec!["2025 Rankings".to_string()],
            vec!["Rk".to_string(), "Team".to_string()],
        ];
        assert_eq!(find_header_row(&rows), Some(1));
    }

    #[test]
    fn netrtg_triple_collision_resolves_in_order() {
        let header: Vec<String> = ["Rk", "Team", "Conf", "WL", "AdjO", "AdjD", "NetRtg", "NetRtg", "NetRtg", "Luck"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let idx = resolve_header(&header).unwrap();
        assert_eq!(idx.net_rating, 6);
        assert_eq!(idx.adj_t, 7);
        assert_eq!(idx.non_conf_sos, 8);
    }

    #[test]
    fn adjd_inferred_two_after_adjo_when_unlabeled() {
        let header: Vec<String> = ["Rk", "Team", "AdjO", "X", "NetRtg", "AdjT", "Luck"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let idx = resolve_header(&header).unwrap();
        assert_eq!(idx.adj_d, idx.adj_o + 2);
    }
}
