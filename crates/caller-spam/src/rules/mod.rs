//! Built-in spam rules.

mod call_pattern;
mod contact_count;
mod second_level_contact;

pub use call_pattern::CallPatternRule;
pub use contact_count::ContactCountRule;
pub use second_level_contact::SecondLevelContactRule;

use std::time::Duration;

/// Score for "trusted by `count` people out of the `threshold` needed".
///
/// Nobody: `max_score`. Below threshold: linear decay from `max_score`. At or above threshold:
/// a residual of at most 0.1 that shrinks toward zero.
pub(crate) fn trust_score(count: usize, threshold: usize, max_score: f64) -> f64 {
    let score = if count == 0 {
        max_score
    } else if count < threshold {
        max_score * (1.0 - count as f64 / threshold as f64)
    } else {
        let (n, t) = (count as f64, threshold as f64);
        (0.1 * (1.0 - (n - t) / (n + t))).max(0.0)
    };
    score.clamp(0.0, 1.0)
}

/// `whole.frac` with `frac` zero-padded to `width` digits and trailing zeros trimmed.
fn with_fraction(whole: u128, frac: u128, width: usize) -> String {
    if frac == 0 {
        return whole.to_string();
    }
    let digits = format!("{:0width$}", frac, width = width);
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}

/// Render a window the way operators write it: `1h0m0s`, `30m0s`, `1.5s`, `500ms`.
pub(crate) fn format_window(window: Duration) -> String {
    let nanos = window.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }
    if nanos < 1_000 {
        return format!("{}ns", nanos);
    }
    if nanos < 1_000_000 {
        return format!("{}µs", with_fraction(nanos / 1_000, nanos % 1_000, 3));
    }
    if nanos < 1_000_000_000 {
        return format!("{}ms", with_fraction(nanos / 1_000_000, nanos % 1_000_000, 6));
    }

    let secs = window.as_secs();
    let (h, m) = (secs / 3600, (secs % 3600) / 60);
    let s = with_fraction(u128::from(secs % 60), u128::from(window.subsec_nanos()), 9);
    if h > 0 {
        format!("{}h{}m{}s", h, m, s)
    } else if m > 0 {
        format!("{}m{}s", m, s)
    } else {
        format!("{}s", s)
    }
}
