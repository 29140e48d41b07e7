//! Interactive prompts for values not given on the command line

use chrono::{Datelike, Local};
use dialoguer::{Input, Password, Select};

use super::CliError;
use crate::downloader::ReportPeriod;

/// Years offered by the year prompt (current year and the four before it)
const SELECTABLE_YEARS: i32 = 5;

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

fn prompt_error(e: dialoguer::Error) -> CliError {
    CliError::PromptError(e.to_string())
}

/// Ask for a non-empty line of text
pub fn prompt_text(prompt: &str) -> Result<String, CliError> {
    let value: String = Input::new()
        .with_prompt(prompt)
        .interact_text()
        .map_err(prompt_error)?;
    Ok(value.trim().to_string())
}

/// Ask for a secret without echoing it
pub fn prompt_secret(prompt: &str) -> Result<String, CliError> {
    Password::new()
        .with_prompt(prompt)
        .allow_empty_password(false)
        .interact()
        .map_err(prompt_error)
}

/// Choices for the day prompt: the whole month first, then each of its days
fn day_choices(month: &ReportPeriod) -> Vec<String> {
    let mut items = vec!["Every day of the month".to_string()];
    items.extend(month.days().iter().map(|d| d.day().to_string()));
    items
}

/// Walk the operator through year, month and day (or whole month)
pub fn prompt_period() -> Result<ReportPeriod, CliError> {
    let current_year = Local::now().year();
    let years: Vec<i32> = (0..SELECTABLE_YEARS).map(|i| current_year - i).collect();
    let year_idx = Select::new()
        .with_prompt("Select the year")
        .items(&years)
        .default(0)
        .interact()
        .map_err(prompt_error)?;
    let year = years[year_idx];

    let month_idx = Select::new()
        .with_prompt("Select the month")
        .items(&MONTH_NAMES)
        .default(0)
        .interact()
        .map_err(prompt_error)?;
    let month = month_idx as u32 + 1;

    let invalid = || CliError::InvalidArgument(format!("invalid date {year}-{month:02}"));
    let whole_month = ReportPeriod::month(year, month).ok_or_else(invalid)?;
    let day_items = day_choices(&whole_month);
    let day_idx = Select::new()
        .with_prompt("Select the day")
        .items(&day_items)
        .default(0)
        .interact()
        .map_err(prompt_error)?;

    if day_idx == 0 {
        return Ok(whole_month);
    }
    ReportPeriod::day(year, month, day_idx as u32).ok_or_else(invalid)
}
