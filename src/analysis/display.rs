use super::config::{FormatOptions, NumberFormatting};

/// Fraction digits used when no formatting option is set.
const DEFAULT_FRACTION_DIGITS: usize = 3;

fn group_thousands(integer_part: &str) -> String {
    let (sign, digits) = match integer_part.strip_prefix('-') {
        Some(digits) => ("-", digits),
        None => ("", integer_part),
    };
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    format!("{}{}", sign, grouped)
}

fn truncate(value: f64, digits: usize) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (value * factor).trunc() / factor
}

/// Format `value` with at most the configured number of fraction digits. Trailing zeros are
/// dropped.
pub fn format_number(value: f64, options: &FormatOptions) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let (value, digits) = match options.number_formatting_option {
        NumberFormatting::Round => (value, options.significant_digits),
        NumberFormatting::Truncate => (
            truncate(value, options.significant_digits),
            options.significant_digits,
        ),
        NumberFormatting::NoFormatting => (value, DEFAULT_FRACTION_DIGITS),
    };
    let formatted = format!("{:.*}", digits, value);
    let formatted = if formatted.contains('.') {
        formatted.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        formatted
    };
    let formatted = if formatted == "-0" { "0".to_string() } else { formatted };
    if !options.show_separator {
        return formatted;
    }
    match formatted.split_once('.') {
        Some((integer_part, fraction)) => format!("{}.{}", group_thousands(integer_part), fraction),
        None => group_thousands(&formatted),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::format_number;
    use crate::analysis::config::{FormatOptions, NumberFormatting};

    #[rstest]
    #[case(1234.5678, NumberFormatting::Round, 2, false, "1234.57")]
    #[case(1234.5678, NumberFormatting::Truncate, 2, false, "1234.56")]
    #[case(1234.5678, NumberFormatting::NoFormatting, 2, true, "1,234.568")]
    #[case(1234567.0, NumberFormatting::Round, 0, true, "1,234,567")]
    #[case(-98765.4, NumberFormatting::Round, 1, true, "-98,765.4")]
    #[case(12.0, NumberFormatting::Round, 2, false, "12")]
    #[case(0.0004, NumberFormatting::Round, 2, false, "0")]
    fn test_format_number(
        #[case] value: f64,
        #[case] option: NumberFormatting,
        #[case] significant_digits: usize,
        #[case] show_separator: bool,
        #[case] expected: &str,
    ) {
        let options = FormatOptions {
            show_separator,
            number_formatting_option: option,
            significant_digits,
        };
        assert_eq!(expected, format_number(value, &options));
    }
}
