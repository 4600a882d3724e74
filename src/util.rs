//! Shared naming helpers
//!
//! All generated identifiers are derived here so that every backend and the
//! test synthesizer agree on names.

/// Convert an entity name to PascalCase
///
/// # Examples
/// ```
/// use specforge::util::to_pascal_case;
/// assert_eq!(to_pascal_case("audit_log"), "AuditLog");
/// assert_eq!(to_pascal_case("contact"), "Contact");
/// ```
pub fn to_pascal_case(s: &str) -> String {
    s.split(['_', '-'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(c) => c.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// Convert PascalCase or camelCase to snake_case
///
/// # Examples
/// ```
/// use specforge::util::to_snake_case;
/// assert_eq!(to_snake_case("AuditLog"), "audit_log");
/// assert_eq!(to_snake_case("Contact"), "contact");
/// ```
pub fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Table name for an entity: `tb_{entity}` in snake case
///
/// # Examples
/// ```
/// use specforge::util::table_name;
/// assert_eq!(table_name("Contact"), "tb_contact");
/// assert_eq!(table_name("AuditLog"), "tb_audit_log");
/// ```
pub fn table_name(entity: &str) -> String {
    format!("tb_{}", to_snake_case(entity))
}

/// Primary-key column for an entity: `pk_{entity}`
pub fn pk_column(entity: &str) -> String {
    format!("pk_{}", to_snake_case(entity))
}

/// Procedural routine name for an action, qualified by entity so that
/// same-named actions on different entities never collide.
///
/// # Examples
/// ```
/// use specforge::util::routine_name;
/// assert_eq!(routine_name("Contact", "promote"), "contact_promote");
/// ```
pub fn routine_name(entity: &str, action: &str) -> String {
    format!("{}_{}", to_snake_case(entity), to_snake_case(action))
}
