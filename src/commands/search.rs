use super::Context;
use anyhow::Result;
use std::path::PathBuf;

pub fn run(profile: Option<PathBuf>, threshold: u8, query: String) -> Result<()> {
    let ctx = Context::load(profile)?;
    let repos = ctx.connect_channels()?;

    // First channel wins on duplicates, matching resolution priority
    let mut seen = std::collections::HashSet::new();
    let mut hits: Vec<(u8, String, String, String)> = Vec::new();
    for repo in &repos {
        for item in repo.iterate_channel_contents() {
            if item.is_asset() {
                continue;
            }
            let module = item.module();
            if !seen.insert(module.clone()) {
                continue;
            }
            let score = score_item(&query, &item.name, &module.to_string(), &item.summary);
            if score >= threshold {
                hits.push((
                    score,
                    module.to_string(),
                    item.version.clone(),
                    item.summary.clone(),
                ));
            }
        }
    }

    if hits.is_empty() {
        println!("No packages matching '{}' found.", query);
        println!();
        return Ok(());
    }

    hits.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    for (_, module, version, summary) in &hits {
        println!("{} ({})", module, version);
        if !summary.is_empty() {
            println!("    {}", summary);
        }
    }
    println!();
    println!("{} packages found", hits.len());
    Ok(())
}

/// Best score of a channel item over its name, full identifier and summary.
pub(crate) fn score_item(query: &str, name: &str, full_name: &str, summary: &str) -> u8 {
    let name_score = fuzzy_score(query, name).max(fuzzy_score(query, full_name));
    // Summary matches are weaker evidence than name matches
    let summary_score = fuzzy_score(query, summary).min(80);
    name_score.max(summary_score)
}

/// Similarity of `query` to `candidate` in 0-100: exact 100, substring 95,
/// otherwise a Levenshtein ratio.
pub(crate) fn fuzzy_score(query: &str, candidate: &str) -> u8 {
    let query = query.to_lowercase();
    let candidate = candidate.to_lowercase();
    if query.is_empty() || candidate.is_empty() {
        return 0;
    }
    if query == candidate {
        return 100;
    }
    if candidate.contains(&query) {
        return 95;
    }
    let distance = levenshtein(&query, &candidate);
    let longest = query.chars().count().max(candidate.chars().count());
    (100usize.saturating_sub(100 * distance / longest)) as u8
}

fn levenshtein(s1: &str, s2: &str) -> usize {
    let len1 = s1.chars().count();
    let len2 = s2.chars().count();
    let mut matrix = vec![vec![0usize; len2 + 1]; len1 + 1];

    for (i, row) in matrix.iter_mut().enumerate().take(len1 + 1) {
        row[0] = i;
    }
    for (j, val) in matrix[0].iter_mut().enumerate().take(len2 + 1) {
        *val = j;
    }

    for (i, c1) in s1.chars().enumerate() {
        for (j, c2) in s2.chars().enumerate() {
            let cost = if c1 == c2 { 0 } else { 1 };
            matrix[i + 1][j + 1] = std::cmp::min(
                std::cmp::min(matrix[i][j + 1] + 1, matrix[i + 1][j] + 1),
                matrix[i][j] + cost,
            );
        }
    }

    matrix[len1][len2]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("roads", "roads"), 0);
        assert_eq!(levenshtein("roads", "road"), 1);
        assert_eq!(levenshtein("", "abc"), 3);
    }

    #[test]
    fn test_fuzzy_score_ordering() {
        let exact = fuzzy_score("essential-fixes", "essential-fixes");
        let substring = fuzzy_score("fixes", "essential-fixes");
        let close = fuzzy_score("essental-fixes", "essential-fixes");
        let unrelated = fuzzy_score("airport", "essential-fixes");

        assert_eq!(exact, 100);
        assert_eq!(substring, 95);
        assert!(close > unrelated);
        assert!(close >= 80, "one typo stays above typical thresholds");
    }

    #[test]
    fn test_summary_matches_are_capped() {
        let score = score_item("fixes", "roads", "memo:roads", "a bundle of fixes");
        assert_eq!(score, 80);
    }
}
