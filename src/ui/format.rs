use chrono::{DateTime, Utc};

/// Spanish "time ago" label, e.g. `hace 5 minutos`.
pub fn relative_time(now: DateTime<Utc>, timestamp_millis: i64) -> String {
    let Some(then) = DateTime::<Utc>::from_timestamp_millis(timestamp_millis) else {
        return String::new();
    };

    let elapsed = now.signed_duration_since(then);
    let minutes = elapsed.num_minutes();
    let hours = elapsed.num_hours();
    let days = elapsed.num_days();

    if minutes < 1 {
        "hace menos de un minuto".to_string()
    } else if minutes < 60 {
        format!("hace {}", plural(minutes, "minuto", "minutos"))
    } else if hours < 24 {
        format!("hace alrededor de {}", plural(hours, "hora", "horas"))
    } else if days < 30 {
        format!("hace {}", plural(days, "día", "días"))
    } else if days < 365 {
        format!("hace {}", plural(days / 30, "mes", "meses"))
    } else {
        format!("hace alrededor de {}", plural(days / 365, "año", "años"))
    }
}

fn plural(count: i64, one: &str, many: &str) -> String {
    if count == 1 {
        format!("1 {one}")
    } else {
        format!("{count} {many}")
    }
}

/// Up to two uppercase initials for the avatar bubble.
pub fn initials(name: &str) -> String {
    let letters: String = name
        .split_whitespace()
        .filter_map(|word| word.chars().next())
        .take(2)
        .flat_map(char::to_uppercase)
        .collect();

    if letters.is_empty() {
        "US".to_string()
    } else {
        letters
    }
}

pub fn role_label(is_privileged: bool) -> &'static str {
    if is_privileged { "ADMIN" } else { "Estudiante" }
}
