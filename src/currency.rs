//! Formatting dollar amounts for display.

use std::sync::OnceLock;

use numfmt::{Formatter, Precision};

/// Format `number` as a dollar amount, e.g. `-1234.5` as `"-$1,234.50"`.
pub fn currency(number: f64) -> String {
    static POSITIVE_FMT: OnceLock<Formatter> = OnceLock::new();

    let positive_fmt = POSITIVE_FMT.get_or_init(|| {
        Formatter::currency("$")
            .unwrap()
            .precision(Precision::Decimals(2))
    });

    static NEGATIVE_FMT: OnceLock<Formatter> = OnceLock::new();

    let negative_fmt = NEGATIVE_FMT.get_or_init(|| {
        Formatter::currency("-$")
            .unwrap()
            .precision(Precision::Decimals(2))
    });

    let mut formatted_string = if number < 0.0 {
        negative_fmt.fmt_string(number.abs())
    } else if number > 0.0 {
        positive_fmt.fmt_string(number)
    } else {
        // Zero is hardcoded as "0", so we must specify the formatted string for zero
        "$0.00".to_owned()
    };

    // numfmt omits the last trailing zero, so we must add it ourselves
    // For example, "12.30" is rendered as "12.3" so we append "0".
    if formatted_string.as_bytes()[formatted_string.len() - 3] != b'.' {
        formatted_string = format!("{formatted_string}0");
    }

    formatted_string
}

#[cfg(test)]
mod currency_tests {
    use super::currency;

    #[test]
    fn formats_positive_amounts_with_separators() {
        assert_eq!(currency(1_234.5), "$1,234.50");
    }

    #[test]
    fn formats_negative_amounts() {
        assert_eq!(currency(-42.0), "-$42.00");
    }

    #[test]
    fn formats_zero() {
        assert_eq!(currency(0.0), "$0.00");
    }
}
