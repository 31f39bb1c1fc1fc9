//! Approximate string similarity on a 0 to 100 scale.

/// Similarity of two strings, as `200 * LCS / (len(a) + len(b))`.
pub fn ratio(a: &str, b: &str) -> u8 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    to_score(ratio_chars(&a, &b))
}

/// Best [ratio] of the shorter string against any window of the longer one.
///
/// Windows cut short by the end of the longer string are also tried, so a key
/// that is truncated at the end still scores. Windows never start before the
/// beginning of the longer string.
pub fn partial_ratio(a: &str, b: &str) -> u8 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };

    if short.is_empty() {
        return 0;
    }

    let m = short.len();
    let n = long.len();
    let mut best = 0.0f64;

    let full_windows = (0..=n - m).map(|start| &long[start..start + m]);
    let tail_windows = (1..m).map(|k| &long[n - k..]);

    for window in full_windows.chain(tail_windows) {
        let r = ratio_chars(&short, window);
        if r > best {
            best = r;
            if best >= 1.0 {
                break;
            }
        }
    }

    to_score(best)
}

fn to_score(r: f64) -> u8 {
    (r * 100.0).round() as u8
}

fn ratio_chars(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * lcs_len(a, b) as f64 / total as f64
}

/// Length of the longest common subsequence.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut cur = vec![0usize; b.len() + 1];

    for ca in a {
        for (j, cb) in b.iter().enumerate() {
            cur[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                cur[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut cur);
    }

    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("ubuntu", "ubuntu-22.04-desktop-amd64.iso", 100; "prefix")]
    #[test_case("mint", "linuxmint-21.2-cinnamon-64bit.iso", 100; "embedded")]
    #[test_case("debian", "debain-12", 83; "transposition")]
    #[test_case("fedora", "fedora", 100; "identical")]
    #[test_case("ubuntu", "my-ubunt", 91; "cut off at the end")]
    #[test_case("mint", "minimal-x.iso", 75; "no window before the start")]
    #[test_case("", "fedora", 0; "empty")]
    fn partial_ratio_scores(a: &str, b: &str, expected: u8) {
        assert_eq!(partial_ratio(a, b), expected);
    }

    #[test]
    fn partial_ratio_is_symmetric() {
        assert_eq!(
            partial_ratio("archlinux", "random-name-xyz"),
            partial_ratio("random-name-xyz", "archlinux")
        );
    }

    #[test]
    fn unrelated_strings_score_low() {
        for key in ["ubuntu", "debian", "fedora", "archlinux"] {
            let score = partial_ratio(key, "random-name-xyz");
            assert!(score <= 80, "{key} scored {score}");
        }
    }

    #[test]
    fn plain_ratio() {
        assert_eq!(ratio("abcd", "abcd"), 100);
        assert_eq!(ratio("abcd", "wxyz"), 0);
        assert_eq!(ratio("ab", "abcd"), 67);
    }
}
