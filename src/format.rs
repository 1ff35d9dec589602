// Display helpers shared by the CLI, TUI and API

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// "$1,234,567.89" / "-$42.00"
pub fn format_currency(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = group_thousands(&(cents / 100).to_string());
    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!("{}${}.{:02}", sign, whole, cents % 100)
}

pub fn format_percentage(value: f64, decimals: usize) -> String {
    format!("{:.*}%", decimals, value)
}

pub fn format_shares(shares: u64) -> String {
    group_thousands(&shares.to_string())
}

/// Signed percentage-point delta, e.g. "+1.25pp"
pub fn format_signed_percentage_points(value: f64) -> String {
    if value > 0.0 {
        format!("+{:.2}pp", value)
    } else {
        format!("{:.2}pp", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_currency() {
        assert_eq!(format_currency(0.0), "$0.00");
        assert_eq!(format_currency(999.5), "$999.50");
        assert_eq!(format_currency(1_234_567.891), "$1,234,567.89");
        assert_eq!(format_currency(-42.0), "-$42.00");
    }

    #[test]
    fn test_format_shares() {
        assert_eq!(format_shares(0), "0");
        assert_eq!(format_shares(100), "100");
        assert_eq!(format_shares(1_000), "1,000");
        assert_eq!(format_shares(10_000_000), "10,000,000");
    }

    #[test]
    fn test_format_percentages() {
        assert_eq!(format_percentage(33.33333, 2), "33.33%");
        assert_eq!(format_percentage(5.0, 0), "5%");
        assert_eq!(format_signed_percentage_points(1.25), "+1.25pp");
        assert_eq!(format_signed_percentage_points(-30.0), "-30.00pp");
    }
}
