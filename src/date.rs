use chrono::{Datelike, Local, NaiveDate};

/// Displayed-month cursor.
///
/// The cursor is always derived from the real current date plus
/// `month_offset`, never from the previously displayed month, so
/// `advance(n)` followed by `advance(-n)` is a round trip.
#[derive(Debug, Clone)]
pub struct DateController {
    today: NaiveDate,
    month_offset: i32,
    current: String,
}

impl Default for DateController {
    fn default() -> Self {
        Self::new()
    }
}

impl DateController {
    pub fn new() -> Self {
        Self::at(Local::now().date_naive())
    }

    pub fn at(today: NaiveDate) -> Self {
        Self {
            today,
            month_offset: 0,
            current: month_key(today.year(), today.month()),
        }
    }

    /// Current cursor as `YYYY_MM`.
    pub fn current(&self) -> &str {
        &self.current
    }

    pub fn month_offset(&self) -> i32 {
        self.month_offset
    }

    pub fn is_real_month(&self) -> bool {
        self.month_offset == 0
    }

    pub fn advance(&mut self, delta: i32) -> &str {
        self.month_offset = self.month_offset.saturating_add(delta);
        let (year, month) = shift(self.today.year(), self.today.month(), self.month_offset);
        self.current = month_key(year, month);
        &self.current
    }

    pub fn reset(&mut self) {
        self.month_offset = 0;
        self.current = month_key(self.today.year(), self.today.month());
    }

    /// Key of the month after the cursor.
    pub fn next_key(&self) -> String {
        self.relative_key(1)
    }

    /// Key of the month before the cursor.
    pub fn previous_key(&self) -> String {
        self.relative_key(-1)
    }

    fn relative_key(&self, delta: i32) -> String {
        let (year, month) = shift(self.today.year(), self.today.month(), self.month_offset.saturating_add(delta));
        month_key(year, month)
    }

    /// Full month name of the cursor, e.g. `January`.
    pub fn month_name(&self) -> String {
        let (year, month) = self.cursor();
        NaiveDate::from_ymd_opt(year, month, 1)
            .map(|date| date.format("%B").to_string())
            .unwrap_or_default()
    }

    /// Month number (1-12) printed in due/closing-date labels.
    pub fn due_month(&self, next_month: bool) -> u32 {
        let (_, month) = self.cursor();
        let month = if next_month { month + 1 } else { month };
        if month > 12 { (month - 1) % 12 + 1 } else { month }
    }

    fn cursor(&self) -> (i32, u32) {
        shift(self.today.year(), self.today.month(), self.month_offset)
    }
}

pub fn month_key(year: i32, month: u32) -> String {
    format!("{year:04}_{month:02}")
}

/// Parses a `YYYY_MM` key into `(year, month)`.
pub fn parse_month_key(key: &str) -> Option<(i32, u32)> {
    let (year, month) = key.split_once('_')?;
    if year.len() != 4 || month.len() != 2 {
        return None;
    }
    let year = year.parse::<i32>().ok()?;
    let month = month.parse::<u32>().ok()?;
    (1..=12).contains(&month).then_some((year, month))
}

/// Shifts `(year, month)` by `delta` months, wrapping across years.
pub fn shift(year: i32, month: u32, delta: i32) -> (i32, u32) {
    let index = i64::from(year) * 12 + i64::from(month) - 1 + i64::from(delta);
    let year = index.div_euclid(12).clamp(i64::from(i32::MIN), i64::from(i32::MAX));
    (year as i32, index.rem_euclid(12) as u32 + 1)
}
