//! Compiled pattern tables for Polish invoice text.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// NIP preceded by its label. Captures the digit run including
    /// optional separators, e.g. "NIP: 526-000-12-46".
    pub static ref NIP_LABELED: Regex =
        Regex::new(r"(?i)\bNIP\b[.:\s]*((?:\d[-\s]?){9}\d)").unwrap();

    /// NIP-shaped digit run without a label. Dashed groupings
    /// (3-3-2-2 or 3-2-2-3) or a bare 10-digit run.
    pub static ref NIP_STANDALONE: Regex =
        Regex::new(r"\b(\d{3}-\d{3}-\d{2}-\d{2}|\d{3}-\d{2}-\d{2}-\d{3}|\d{10})\b").unwrap();

    /// REGON preceded by its label (9 or 14 digits).
    pub static ref REGON_LABELED: Regex =
        Regex::new(r"(?i)\bREGON\b[.:\s]*(\d{14}|\d{9})\b").unwrap();

    /// Invoice number preceded by a label ("Faktura VAT nr FV/01/2024",
    /// "nr faktury: 12/2024"). The capture still has to contain a digit;
    /// callers check that.
    pub static ref INVOICE_LABELED: Regex = Regex::new(
        r"(?i)(?:faktura(?:\s+vat)?\s+|rachunek\s+)?\b(?:nr|numer|no)\b\.?(?:\s+faktury)?\s*:?\s*([A-Za-z0-9][A-Za-z0-9/\-\.]*)"
    )
    .unwrap();

    /// Invoice number in a common prefixed shape without a label,
    /// e.g. "FV/01/2024", "FA-123/24".
    pub static ref INVOICE_STANDALONE: Regex =
        Regex::new(r"\b(?:FV|FA|FS|FVS)[/\-]?\d+(?:[/\-]\d+)*\b").unwrap();

    /// Day-first date with a four-digit year: 15.03.2024, 15-03-2024,
    /// 15/03/2024.
    pub static ref DATE_DMY: Regex =
        Regex::new(r"\b(\d{1,2})[./\-](\d{1,2})[./\-](\d{4})\b").unwrap();

    /// ISO-style date: 2024-03-15.
    pub static ref DATE_YMD: Regex =
        Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").unwrap();

    /// Day-first date with a two-digit year. Ambiguous; kept as an
    /// unparsed candidate instead of guessing the century.
    pub static ref DATE_SHORT_YEAR: Regex =
        Regex::new(r"\b(\d{1,2})[./\-](\d{1,2})[./\-](\d{2})\b").unwrap();

    /// Issue-date labels.
    pub static ref ISSUE_DATE_LABEL: Regex =
        Regex::new(r"(?i)data\s+wystawienia|wystawiono(?:\s+dnia)?|data\s+faktury").unwrap();

    /// Monetary amount with an optional thousands grouping and a
    /// two-digit decimal part: "1 234,56", "1.234,56", "1234.56".
    pub static ref AMOUNT: Regex = Regex::new(
        r"\b(?:\d{1,3}(?:[ \u{00A0}.]\d{3})+[,.]\d{2}|\d+[,.]\d{2})\b"
    )
    .unwrap();

    /// Net-amount labels.
    pub static ref NET_LABEL: Regex =
        Regex::new(r"(?i)\bnetto\b").unwrap();

    /// Gross-amount labels.
    pub static ref GROSS_LABEL: Regex =
        Regex::new(r"(?i)\bbrutto\b|do\s+zap[łl]aty|\brazem\b|\bsuma\b").unwrap();

    /// VAT-amount labels.
    pub static ref VAT_AMOUNT_LABEL: Regex =
        Regex::new(r"(?i)kwota\s+vat|\bpodatek\b").unwrap();

    /// VAT rate as a percentage ("23%", "23 %").
    pub static ref VAT_PERCENT: Regex =
        Regex::new(r"\b(\d{1,2})\s*%").unwrap();

    /// VAT exemption markers: zw. (zwolniony), np. (nie podlega).
    /// "np" doubles as ordinary Polish prose, hence low specificity
    /// at the call site.
    pub static ref VAT_MARKER: Regex =
        Regex::new(r"(?i)\b(zw|np)\b\.?").unwrap();
}

/// Keep only ASCII digits.
pub fn digits_only(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}
