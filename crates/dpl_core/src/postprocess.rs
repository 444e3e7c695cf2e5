use rand::Rng;
use rand::seq::SliceRandom;
use tracing::debug;

use crate::namespace::PageTitle;
use crate::parameters::ParameterSet;
use crate::query::ResultRow;

/// Apply sampling, recursion and subpage guards, reversal and suit ordering to fetched rows.
pub fn process<R>(
    rows: Vec<ResultRow>,
    params: &ParameterSet,
    current: Option<&PageTitle>,
    rng: &mut R,
) -> Vec<ResultRow>
where
    R: Rng + ?Sized,
{
    let fetched = rows.len();
    let mut rows = match params.random_count {
        Some(count) if count > 0 => random_sample(rows, count, rng),
        _ => rows,
    };
    if !params.include_subpages {
        rows.retain(|row| !row.page.is_subpage());
    }
    if params.skip_this_page
        && let Some(current) = current
    {
        rows.retain(|row| !same_page(&row.page, current));
    }
    if params.reverses_results() {
        rows.reverse();
    }
    if params.order_suit_symbols {
        card_suit_sort(&mut rows);
    }
    debug!(fetched, kept = rows.len(), "post-processed rows");
    rows
}

fn same_page(left: &PageTitle, right: &PageTitle) -> bool {
    left.namespace_id == right.namespace_id && left.text == right.text
}

/// Uniform sample without replacement that keeps the original relative order.
pub fn random_sample<T, R>(items: Vec<T>, count: usize, rng: &mut R) -> Vec<T>
where
    R: Rng + ?Sized,
{
    if count >= items.len() {
        return items;
    }
    let mut picks = (0..items.len()).collect::<Vec<_>>();
    picks.shuffle(rng);
    let mut keep = vec![false; items.len()];
    for index in picks.into_iter().take(count) {
        keep[index] = true;
    }
    items
        .into_iter()
        .zip(keep)
        .filter_map(|(item, keep)| keep.then_some(item))
        .collect()
}

/// Sort key for bridge bidding titles such as `1♣ - 1NT - Pass`.
pub fn card_suit_key(title: &str) -> String {
    let title = title.rsplit_once(':').map_or(title, |(_, rest)| rest);
    let mut key = String::new();
    for token in split_bids(title) {
        let mut chars = token.chars();
        match chars.next() {
            Some(rank @ '1'..='7') => {
                key.push(rank);
                let suit = chars.as_str();
                match suit {
                    "♣" => key.push('1'),
                    "♦" => key.push('2'),
                    "♥" => key.push('3'),
                    "♠" => key.push('4'),
                    _ if suit.eq_ignore_ascii_case("sa") || suit.eq_ignore_ascii_case("nt") => {
                        key.push_str("5 ")
                    }
                    _ => key.push_str(suit),
                }
            }
            Some('p' | 'P') => key.push_str("0 "),
            Some('x' | 'X') => key.push_str("8 "),
            _ => key.push_str(token),
        }
    }
    key
}

/// Split on ` -` followed by any run of spaces.
fn split_bids(title: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut rest = title;
    while let Some(position) = rest.find(" -") {
        tokens.push(&rest[..position]);
        rest = rest[position + 2..].trim_start_matches(' ');
    }
    tokens.push(rest);
    tokens
}

pub fn card_suit_sort(rows: &mut [ResultRow]) {
    rows.sort_by_cached_key(|row| card_suit_key(&row.page.prefixed()));
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::namespace::NamespaceTable;
    use crate::parameters::SortOrder;

    fn rows(titles: &[&str]) -> Vec<ResultRow> {
        let namespaces = NamespaceTable::default();
        titles
            .iter()
            .map(|title| ResultRow {
                page: namespaces.parse_title(title).expect("title"),
                exists: true,
                ..ResultRow::default()
            })
            .collect()
    }

    fn titles(rows: &[ResultRow]) -> Vec<String> {
        rows.iter().map(|row| row.page.prefixed()).collect()
    }

    #[test]
    fn random_sample_keeps_order_and_size() {
        let mut rng = StdRng::seed_from_u64(7);
        let input = (0..20).collect::<Vec<_>>();
        for count in [1, 5, 19] {
            let sample = random_sample(input.clone(), count, &mut rng);
            assert_eq!(sample.len(), count);
            assert!(sample.windows(2).all(|pair| pair[0] < pair[1]));
        }
        assert_eq!(random_sample(input.clone(), 20, &mut rng), input);
        assert_eq!(random_sample(input.clone(), 50, &mut rng), input);
    }

    #[test]
    fn skip_this_page_guards_against_self_reference() {
        let mut rng = StdRng::seed_from_u64(1);
        let namespaces = NamespaceTable::default();
        let current = namespaces.parse_title("Beta").expect("title");
        let mut params = ParameterSet::default();

        let kept = process(rows(&["Alpha", "Beta", "Gamma"]), &params, Some(&current), &mut rng);
        assert_eq!(titles(&kept), vec!["Alpha", "Gamma"]);

        params.skip_this_page = false;
        let kept = process(rows(&["Alpha", "Beta", "Gamma"]), &params, Some(&current), &mut rng);
        assert_eq!(titles(&kept), vec!["Alpha", "Beta", "Gamma"]);
    }

    #[test]
    fn subpages_can_be_excluded() {
        let mut rng = StdRng::seed_from_u64(1);
        let params = ParameterSet {
            include_subpages: false,
            ..ParameterSet::default()
        };
        let kept = process(rows(&["Guide", "Guide/Intro", "Other"]), &params, None, &mut rng);
        assert_eq!(titles(&kept), vec!["Guide", "Other"]);
    }

    #[test]
    fn reversal_applies_only_to_upper_bound_descending() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut params = ParameterSet {
            title_lt: Some("M".to_string()),
            order: SortOrder::Descending,
            ..ParameterSet::default()
        };
        let kept = process(rows(&["C", "B", "A"]), &params, None, &mut rng);
        assert_eq!(titles(&kept), vec!["A", "B", "C"]);

        params.title_gt = Some("0".to_string());
        let kept = process(rows(&["C", "B", "A"]), &params, None, &mut rng);
        assert_eq!(titles(&kept), vec!["C", "B", "A"]);
    }

    #[test]
    fn card_suit_keys_map_ranks_suits_and_calls() {
        assert_eq!(card_suit_key("7♠ - 1NT"), "7415 ");
        assert_eq!(card_suit_key("2♣ - Pass"), "210 ");
        assert_eq!(card_suit_key("AKQ - X"), "AKQ8 ");
        assert_eq!(card_suit_key("Bidding:1♦ -   2♥"), "1223");
    }

    #[test]
    fn card_suit_sort_orders_bidding_sequences() {
        let mut rng = StdRng::seed_from_u64(1);
        let params = ParameterSet {
            order_suit_symbols: true,
            ..ParameterSet::default()
        };
        let kept = process(
            rows(&["7♠ - 1NT", "AKQ - X", "2♣ - Pass"]),
            &params,
            None,
            &mut rng,
        );
        assert_eq!(titles(&kept), vec!["2♣ - Pass", "7♠ - 1NT", "AKQ - X"]);
    }

    #[test]
    fn random_count_limits_processed_rows() {
        let mut rng = StdRng::seed_from_u64(3);
        let params = ParameterSet {
            random_count: Some(2),
            ..ParameterSet::default()
        };
        let input = rows(&["A", "B", "C", "D", "E"]);
        let kept = process(input.clone(), &params, None, &mut rng);
        assert_eq!(kept.len(), 2);
        let positions = kept
            .iter()
            .map(|row| input.iter().position(|candidate| candidate == row).expect("subset"))
            .collect::<Vec<_>>();
        assert!(positions[0] < positions[1]);
    }
}
