/// Normaliza un número telefónico nigeriano al formato local de 11 dígitos
/// (`0XXXXXXXXXX`). Acepta las variantes `+234...` y `234...` que envían
/// algunos clientes.
pub fn normalize(raw: &str) -> Option<String> {
    let digits: String = raw
        .trim()
        .trim_start_matches('+')
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();

    let local = if let Some(rest) = digits.strip_prefix("234") {
        format!("0{}", rest)
    } else {
        digits
    };

    if is_valid_local(&local) {
        Some(local)
    } else {
        None
    }
}

// 11 dígitos, prefijos móviles 070/080/081/090/091.
fn is_valid_local(number: &str) -> bool {
    if number.len() != 11 || !number.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    matches!(&number[..3], "070" | "080" | "081" | "090" | "091")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("08031234567", "08031234567")]
    #[case("+2348031234567", "08031234567")]
    #[case("2349012345678", "09012345678")]
    #[case(" 07051234567 ", "07051234567")]
    fn test_normalize_accepts_valid_numbers(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize(input).as_deref(), Some(expected));
    }

    #[rstest]
    #[case("")]
    #[case("12345")]
    #[case("08031234")] // corto
    #[case("060312345678")] // prefijo desconocido
    #[case("not-a-number")]
    fn test_normalize_rejects_invalid_numbers(#[case] input: &str) {
        assert_eq!(normalize(input), None);
    }
}
