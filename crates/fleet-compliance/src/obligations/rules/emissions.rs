use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use super::calendar::{add_months_clamped, add_years_clamped, clamped_date};

/// Days added when a vehicle has no recognizable color band.
pub const FALLBACK_INTERVAL_DAYS: i64 = 182;

/// Exemption class encoded by the holograma sticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Exemption {
    /// Holograma "00": verify again in two years.
    Full,
    /// Holograma "0": verify again in six months.
    Half,
    /// Any other holograma follows the color-band calendar.
    Standard,
}

impl Exemption {
    pub fn parse(code: &str) -> Self {
        match code.trim() {
            "00" => Self::Full,
            "0" => Self::Half,
            _ => Self::Standard,
        }
    }
}

/// Half of the calendar year used by the verification schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Semester {
    First,
    Second,
}

impl Semester {
    pub const fn containing(month: u32) -> Self {
        if month <= 6 {
            Self::First
        } else {
            Self::Second
        }
    }

    pub const fn opposite(self) -> Self {
        match self {
            Self::First => Self::Second,
            Self::Second => Self::First,
        }
    }

    pub const fn number(self) -> u8 {
        match self {
            Self::First => 1,
            Self::Second => 2,
        }
    }
}

/// Engomado color derived from the last digit of the plate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorBand {
    Amarillo,
    Rosa,
    Rojo,
    Verde,
    Azul,
}

impl ColorBand {
    pub const fn ordered() -> [Self; 5] {
        [
            Self::Amarillo,
            Self::Rosa,
            Self::Rojo,
            Self::Verde,
            Self::Azul,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Amarillo => "amarillo",
            Self::Rosa => "rosa",
            Self::Rojo => "rojo",
            Self::Verde => "verde",
            Self::Azul => "azul",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ordered()
            .into_iter()
            .find(|band| band.label() == normalized)
    }

    pub fn from_plate(plate: &str) -> Option<Self> {
        match plate.trim().chars().last()? {
            '1' | '2' => Some(Self::Verde),
            '3' | '4' => Some(Self::Rojo),
            '5' | '6' => Some(Self::Amarillo),
            '7' | '8' => Some(Self::Rosa),
            '9' | '0' => Some(Self::Azul),
            _ => None,
        }
    }

    /// The two months in `semester` during which this color must verify.
    pub const fn window(self, semester: Semester) -> [u32; 2] {
        let first = match self {
            Self::Amarillo => 1,
            Self::Rosa => 2,
            Self::Rojo => 3,
            Self::Verde => 4,
            Self::Azul => 5,
        };
        match semester {
            Semester::First => [first, first + 1],
            Semester::Second => [first + 6, first + 7],
        }
    }
}

/// Month-by-month listing of which colors verify in that month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarMonth {
    pub month: u32,
    pub colors: Vec<ColorBand>,
}

pub fn emissions_calendar() -> Vec<CalendarMonth> {
    (1..=12)
        .map(|month| CalendarMonth {
            month,
            colors: ColorBand::ordered()
                .into_iter()
                .filter(|band| band.window(Semester::containing(month)).contains(&month))
                .collect(),
        })
        .collect()
}

pub fn next_due(
    reference: NaiveDate,
    exemption: Exemption,
    color_band: Option<ColorBand>,
) -> Option<NaiveDate> {
    match exemption {
        Exemption::Full => add_years_clamped(reference, 2),
        Exemption::Half => add_months_clamped(reference, 6),
        Exemption::Standard => match color_band {
            Some(band) => next_window_date(reference, band),
            None => reference.checked_add_signed(Duration::days(FALLBACK_INTERVAL_DAYS)),
        },
    }
}

fn next_window_date(reference: NaiveDate, band: ColorBand) -> Option<NaiveDate> {
    let month = reference.month();
    let semester = Semester::containing(month);
    let target = band
        .window(semester)
        .into_iter()
        .find(|candidate| *candidate >= month)
        .unwrap_or_else(|| band.window(semester.opposite())[0]);

    let year = if target < month {
        reference.year().checked_add(1)?
    } else {
        reference.year()
    };
    clamped_date(year, target, reference.day())
}
