//! Numeral expansion for spoken fragments.
//!
//! The voice sink reads text literally, so numerals are expanded into words
//! before a fragment is handed over:
//!
//! 1. An enumerated-list prefix at the start of a line (`"1. "`) becomes an
//!    ordinal followed by a comma (`"first, "`).
//! 2. Standalone integers 0–99 become words (`21` → `twenty-one`).
//! 3. Larger integers and decimals are read digit by digit, with the decimal
//!    point read as `point` (`3.5` → `three point five`).
//!
//! Numerals glued to letters (`0x9f`, `21st`, `0.002eth`) are left untouched.

const ONES: [&str; 20] = [
    "zero",
    "one",
    "two",
    "three",
    "four",
    "five",
    "six",
    "seven",
    "eight",
    "nine",
    "ten",
    "eleven",
    "twelve",
    "thirteen",
    "fourteen",
    "fifteen",
    "sixteen",
    "seventeen",
    "eighteen",
    "nineteen",
];

const TENS: [&str; 10] = [
    "", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
];

const ORDINAL_ONES: [&str; 20] = [
    "zeroth",
    "first",
    "second",
    "third",
    "fourth",
    "fifth",
    "sixth",
    "seventh",
    "eighth",
    "ninth",
    "tenth",
    "eleventh",
    "twelfth",
    "thirteenth",
    "fourteenth",
    "fifteenth",
    "sixteenth",
    "seventeenth",
    "eighteenth",
    "nineteenth",
];

const ORDINAL_TENS: [&str; 10] = [
    "",
    "",
    "twentieth",
    "thirtieth",
    "fortieth",
    "fiftieth",
    "sixtieth",
    "seventieth",
    "eightieth",
    "ninetieth",
];

/// Expand list prefixes and numerals in `text` into spoken words.
pub fn normalize_numbers(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let line = expand_list_prefix(line);
        out.push_str(&expand_numerals(&line));
    }
    out
}

/// Replace a leading `"N. "` with `"<ordinal>, "`.
fn expand_list_prefix(line: &str) -> String {
    let trimmed = line.trim_start();
    let indent = &line[..line.len() - trimmed.len()];
    let digits_len = trimmed.bytes().take_while(u8::is_ascii_digit).count();
    if digits_len == 0 {
        return line.to_owned();
    }
    let rest = &trimmed[digits_len..];
    let Some(after_dot) = rest.strip_prefix('.') else {
        return line.to_owned();
    };
    if !after_dot.starts_with(' ') {
        return line.to_owned();
    }
    let Some(word) = trimmed[..digits_len]
        .parse::<u32>()
        .ok()
        .and_then(ordinal_word)
    else {
        return line.to_owned();
    };
    format!("{indent}{word},{after_dot}")
}

/// Ordinal word for 1–99.
fn ordinal_word(n: u32) -> Option<String> {
    match n {
        1..=19 => Some(ORDINAL_ONES[n as usize].to_owned()),
        20..=99 => {
            let (tens, ones) = ((n / 10) as usize, (n % 10) as usize);
            if ones == 0 {
                Some(ORDINAL_TENS[tens].to_owned())
            } else {
                Some(format!("{}-{}", TENS[tens], ORDINAL_ONES[ones]))
            }
        }
        _ => None,
    }
}

/// Cardinal word for 0–99.
fn cardinal_word(n: u32) -> Option<String> {
    match n {
        0..=19 => Some(ONES[n as usize].to_owned()),
        20..=99 => {
            let (tens, ones) = ((n / 10) as usize, (n % 10) as usize);
            if ones == 0 {
                Some(TENS[tens].to_owned())
            } else {
                Some(format!("{}-{}", TENS[tens], ONES[ones]))
            }
        }
        _ => None,
    }
}

fn digit_words(digits: &str) -> impl Iterator<Item = &'static str> + '_ {
    digits
        .bytes()
        .filter(u8::is_ascii_digit)
        .map(|b| ONES[(b - b'0') as usize])
}

/// Spoken form of a numeric token (`"21"`, `"500"`, `"3.5"`).
fn speak_number(integer: &str, fraction: Option<&str>) -> String {
    if let Some(fraction) = fraction {
        let mut words: Vec<&str> = digit_words(integer).collect();
        words.push("point");
        words.extend(digit_words(fraction));
        return words.join(" ");
    }
    let small = if integer.len() <= 2 {
        integer.parse::<u32>().ok().and_then(cardinal_word)
    } else {
        None
    };
    small.unwrap_or_else(|| digit_words(integer).collect::<Vec<_>>().join(" "))
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn expand_numerals(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < len {
        let c = chars[i];
        let starts_token = c.is_ascii_digit() && (i == 0 || !is_word_char(chars[i - 1]));
        if !starts_token {
            out.push(c);
            i += 1;
            continue;
        }

        let int_start = i;
        while i < len && chars[i].is_ascii_digit() {
            i += 1;
        }
        let integer: String = chars[int_start..i].iter().collect();

        let mut fraction: Option<String> = None;
        if i + 1 < len && chars[i] == '.' && chars[i + 1].is_ascii_digit() {
            let frac_start = i + 1;
            let mut j = frac_start;
            while j < len && chars[j].is_ascii_digit() {
                j += 1;
            }
            fraction = Some(chars[frac_start..j].iter().collect());
            i = j;
        }

        let glued = i < len && (chars[i].is_ascii_alphabetic() || chars[i] == '_');
        if glued {
            out.extend(&chars[int_start..i]);
            // Swallow the rest of the word so trailing digits stay literal.
            while i < len && is_word_char(chars[i]) {
                out.push(chars[i]);
                i += 1;
            }
            continue;
        }

        out.push_str(&speak_number(&integer, fraction.as_deref()));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_prefix_and_compound() {
        assert_eq!(
            normalize_numbers("1. Second 21 items"),
            "first, Second twenty-one items"
        );
    }

    #[test]
    fn decimal_reads_point() {
        assert_eq!(normalize_numbers("3.5"), "three point five");
    }

    #[test]
    fn zero() {
        assert_eq!(normalize_numbers("0"), "zero");
    }

    #[test]
    fn teens_and_round_tens() {
        assert_eq!(normalize_numbers("13 and 40"), "thirteen and forty");
        assert_eq!(normalize_numbers("99"), "ninety-nine");
    }

    #[test]
    fn large_integers_read_digit_by_digit() {
        assert_eq!(normalize_numbers("supply 500"), "supply five zero zero");
    }

    #[test]
    fn multi_digit_decimal() {
        assert_eq!(
            normalize_numbers("costs 0.25 each"),
            "costs zero point two five each"
        );
    }

    #[test]
    fn sentence_final_period_is_not_a_decimal() {
        assert_eq!(normalize_numbers("I have 3."), "I have three.");
    }

    #[test]
    fn numerals_glued_to_letters_untouched() {
        assert_eq!(normalize_numbers("0x9f and 21st"), "0x9f and 21st");
        assert_eq!(normalize_numbers("fee 0.002eth"), "fee 0.002eth");
        assert_eq!(normalize_numbers("v2"), "v2");
    }

    #[test]
    fn list_prefix_on_every_line() {
        assert_eq!(
            normalize_numbers("1. Red\n2. Blue\n12. Green"),
            "first, Red\nsecond, Blue\ntwelfth, Green"
        );
    }

    #[test]
    fn compound_ordinals() {
        assert_eq!(normalize_numbers("23. Item"), "twenty-third, Item");
        assert_eq!(normalize_numbers("30. Item"), "thirtieth, Item");
    }

    #[test]
    fn large_list_prefix_falls_back_to_digits() {
        assert_eq!(normalize_numbers("100. Item"), "one zero zero. Item");
    }

    #[test]
    fn period_without_space_is_not_a_list_prefix() {
        assert_eq!(normalize_numbers("1.5 cats"), "one point five cats");
    }

    #[test]
    fn plain_text_unchanged() {
        assert_eq!(normalize_numbers("Hello there."), "Hello there.");
        assert_eq!(normalize_numbers(""), "");
    }

    #[test]
    fn cjk_text_with_numbers() {
        assert_eq!(normalize_numbers("价格是 5 个"), "价格是 five 个");
    }
}
