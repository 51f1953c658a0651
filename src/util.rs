use crate::{Error, Result};

pub(crate) fn canonicalize_unit_name(input: &str) -> Result<String> {
    validate_no_control("unit", input)?;
    let input = input.trim();
    if input.is_empty() {
        return Err(Error::invalid_input("unit must not be empty"));
    }
    if input.contains('/') || input.contains('\\') {
        return Err(Error::invalid_input(
            "unit must not contain path separators",
        ));
    }
    if input.contains("..") {
        return Err(Error::invalid_input("unit must not contain '..'"));
    }
    if let Some(c) = input
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, ':' | '_' | '.' | '-' | '@')))
    {
        return Err(Error::invalid_input(format!(
            "unit must not contain {c:?}"
        )));
    }

    let unit = if input.contains('.') {
        input.to_string()
    } else {
        format!("{input}.service")
    };
    if !unit.ends_with(".service") || unit == ".service" {
        return Err(Error::invalid_input("service unit must end with .service"));
    }
    Ok(unit)
}

/// Complete a target shorthand (`multi-user`) to a unit name (`multi-user.target`).
pub(crate) fn canonicalize_target_name(context: &'static str, input: &str) -> Result<String> {
    validate_no_control(context, input)?;
    let input = input.trim();
    if input.is_empty() {
        return Err(Error::invalid_input(format!(
            "{context} must not contain empty items"
        )));
    }
    if input.contains(char::is_whitespace) || input.contains('/') {
        return Err(Error::invalid_input(format!(
            "{context} item {input:?} is not a unit name"
        )));
    }
    if input.contains('.') {
        return Ok(input.to_string());
    }
    Ok(format!("{input}.target"))
}

pub(crate) fn validate_env_key(input: &str) -> Result<()> {
    validate_no_control("env key", input)?;
    if input.is_empty() {
        return Err(Error::invalid_input("env key must not be empty"));
    }
    if input.contains('=') {
        return Err(Error::invalid_input("env key must not contain '='"));
    }
    if input.contains(char::is_whitespace) {
        return Err(Error::invalid_input("env key must not contain whitespace"));
    }
    Ok(())
}

pub(crate) fn validate_no_control(context: &'static str, input: &str) -> Result<()> {
    if input.contains('\0') {
        return Err(Error::invalid_input(format!(
            "{context} must not contain NUL"
        )));
    }
    if input.contains('\n') || input.contains('\r') {
        return Err(Error::invalid_input(format!(
            "{context} must not contain newlines"
        )));
    }
    if input.chars().any(|c| c.is_control()) {
        return Err(Error::invalid_input(format!(
            "{context} must not contain control characters"
        )));
    }
    Ok(())
}

/// Escape systemd specifiers (`%`) in a free-form value.
pub(crate) fn escape_specifiers(input: &str) -> String {
    input.replace('%', "%%")
}

/// Double-quote a value for settings that unquote (e.g. `Environment=`).
pub(crate) fn quote_systemd_value(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 2);
    out.push('"');
    for c in input.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '%' => out.push_str("%%"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Render an argv as an `ExecStart=` command line.
///
/// Arguments are quoted only when needed; `$` is doubled so systemd does not expand variables.
pub(crate) fn render_systemd_exec(argv: &[String]) -> Result<String> {
    let mut parts = Vec::<String>::with_capacity(argv.len());
    for arg in argv {
        validate_no_control("exec argv", arg)?;
        let escaped = arg.replace('$', "$$");
        let needs_quotes = escaped.is_empty()
            || escaped
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '\\' | ';'));
        if needs_quotes {
            parts.push(quote_systemd_value(&escaped));
        } else {
            parts.push(escape_specifiers(&escaped));
        }
    }
    Ok(parts.join(" "))
}
