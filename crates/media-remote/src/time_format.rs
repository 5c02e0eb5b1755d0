const MICROS_PER_SECOND: i64 = 1_000_000;
const MICROS_PER_MINUTE: i64 = 60 * MICROS_PER_SECOND;
const MICROS_PER_HOUR: i64 = 60 * MICROS_PER_MINUTE;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Hms {
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

/// Split a microsecond count into whole hours, minutes and seconds.
/// Negative input is treated as zero.
pub fn to_time(micros: i64) -> Hms {
    let mut remaining = micros.max(0);
    let hours = remaining / MICROS_PER_HOUR;
    remaining %= MICROS_PER_HOUR;
    let minutes = remaining / MICROS_PER_MINUTE;
    remaining %= MICROS_PER_MINUTE;
    Hms {
        hours,
        minutes,
        seconds: remaining / MICROS_PER_SECOND,
    }
}

/// `mm:ss`, or `h:mm:ss` when `max` (the track length) reaches an hour.
pub fn format_time(time: Hms, max: Hms) -> String {
    if max.hours > 0 {
        format!("{}:{:02}:{:02}", time.hours, time.minutes, time.seconds)
    } else {
        format!("{:02}:{:02}", time.minutes, time.seconds)
    }
}

/// `position / length` as shown next to the seek bar.
pub fn progress_label(position_us: i64, length_us: i64) -> String {
    let max = to_time(length_us);
    format!(
        "{} / {}",
        format_time(to_time(position_us), max),
        format_time(max, max)
    )
}
