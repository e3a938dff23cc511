//! Input validation for recurring-rule fields (cron expressions, timezones).

/// Validate an IANA timezone string.
pub fn validate_timezone(tz: &str) -> Result<(), String> {
    if tz.parse::<chrono_tz::Tz>().is_err() {
        Err(format!(
            "invalid timezone: '{}' — use IANA names like 'America/New_York' or 'UTC'",
            tz
        ))
    } else {
        Ok(())
    }
}

/// Validate a 5-field cron expression. Returns `Ok(())` or an error message.
pub fn validate_cron(cron: &str) -> Result<(), String> {
    let fields: Vec<&str> = cron.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(format!(
            "expected 5 fields (minute hour dom month dow), got {}",
            fields.len()
        ));
    }
    let names = ["minute", "hour", "day-of-month", "month", "day-of-week"];
    let ranges: [(u32, u32); 5] = [(0, 59), (0, 23), (1, 31), (1, 12), (0, 6)];

    for (i, field) in fields.iter().enumerate() {
        validate_cron_field(field, names[i], ranges[i].0, ranges[i].1)?;
    }
    Ok(())
}

fn validate_cron_field(field: &str, name: &str, min: u32, max: u32) -> Result<(), String> {
    if field == "*" {
        return Ok(());
    }
    if let Some(step) = field.strip_prefix("*/") {
        let n: u32 = step
            .parse()
            .map_err(|_| format!("{}: invalid step '*/{}' — expected a number", name, step))?;
        if n == 0 || n > max {
            return Err(format!("{}: step {} out of range 1..={}", name, n, max));
        }
        return Ok(());
    }
    for part in field.split(',') {
        if let Some((start_s, end_s)) = part.split_once('-') {
            let start: u32 = start_s.parse().map_err(|_| {
                format!("{}: invalid range start '{}'", name, start_s)
            })?;
            let end: u32 = end_s.parse().map_err(|_| {
                format!("{}: invalid range end '{}'", name, end_s)
            })?;
            if start < min || start > max || end < min || end > max {
                return Err(format!(
                    "{}: range {}-{} out of bounds {}..={}",
                    name, start, end, min, max
                ));
            }
            if start > end {
                return Err(format!(
                    "{}: range start {} > end {}",
                    name, start, end
                ));
            }
        } else {
            let n: u32 = part.parse().map_err(|_| {
                format!("{}: invalid value '{}'", name, part)
            })?;
            if n < min || n > max {
                return Err(format!(
                    "{}: value {} out of range {}..={}",
                    name, n, min, max
                ));
            }
        }
    }
    Ok(())
}
