/// Lox numbers print without a trailing `.0` for integral values, matching
/// the usual jlox/clox `numToString` behavior. Shared by both engines so
/// `print 1 + 2;` reads identically no matter which one ran it.
pub fn format_number(n: f64) -> String {
    if n.is_infinite() { return if n > 0.0 { "inf".to_string() } else { "-inf".to_string() }; }
    if n.is_nan() { return "NaN".to_string(); }
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}
