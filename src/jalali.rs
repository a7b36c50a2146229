//! jalali.rs — Persian (Jalali) calendar arithmetic
//!
//! The outage provider reports dates in the Jalali calendar and expects the
//! request date range in the same form, so both conversion directions are
//! needed. The arithmetic is the 2820-break-list algorithm used by the common
//! Jalaali libraries, kept as plain integer math over Julian day numbers.

use chrono::{Datelike, NaiveDate};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JalaliError {
    #[error("jalali year {0} is outside the supported range")]
    YearOutOfRange(i64),
    #[error("invalid jalali date {0:04}/{1:02}/{2:02}")]
    InvalidDate(i64, i64, i64),
}

/// Years in which the March-equinox alignment of the Jalali calendar shifts.
const BREAKS: [i64; 20] = [
    -61, 9, 38, 199, 426, 686, 756, 818, 1111, 1181, 1210, 1635, 2060, 2097, 2192, 2262, 2324,
    2394, 2456, 3178,
];

/// Converts a Jalali date to the corresponding Gregorian calendar date.
pub fn jalali_to_gregorian(jy: i64, jm: i64, jd: i64) -> Result<NaiveDate, JalaliError> {
    if !(1..=12).contains(&jm) || jd < 1 || jd > month_length(jy, jm)? {
        return Err(JalaliError::InvalidDate(jy, jm, jd));
    }

    let (gy, gm, gd) = d2g(j2d(jy, jm, jd)?);
    NaiveDate::from_ymd_opt(gy as i32, gm as u32, gd as u32)
        .ok_or(JalaliError::InvalidDate(jy, jm, jd))
}

/// Converts a Gregorian calendar date to its Jalali (year, month, day) triple.
pub fn gregorian_to_jalali(date: NaiveDate) -> Result<(i64, i64, i64), JalaliError> {
    d2j(g2d(
        i64::from(date.year()),
        i64::from(date.month()),
        i64::from(date.day()),
    ))
}

/// Formats a Gregorian date as the zero-padded Jalali "YYYY/MM/DD" string the
/// provider API expects.
pub fn format_jalali(date: NaiveDate) -> Result<String, JalaliError> {
    let (jy, jm, jd) = gregorian_to_jalali(date)?;
    Ok(format!("{jy:04}/{jm:02}/{jd:02}"))
}

/// Number of days in the given Jalali month.
pub fn month_length(jy: i64, jm: i64) -> Result<i64, JalaliError> {
    Ok(match jm {
        1..=6 => 31,
        7..=11 => 30,
        12 => {
            if is_leap_year(jy)? {
                30
            } else {
                29
            }
        }
        _ => return Err(JalaliError::InvalidDate(jy, jm, 1)),
    })
}

pub fn is_leap_year(jy: i64) -> Result<bool, JalaliError> {
    Ok(jal_cal(jy)?.leap == 0)
}

struct JalCal {
    leap: i64,
    gy: i64,
    /// Day of March carrying the first day of this Jalali year.
    march: i64,
}

fn jal_cal(jy: i64) -> Result<JalCal, JalaliError> {
    if jy < BREAKS[0] || jy >= BREAKS[BREAKS.len() - 1] {
        return Err(JalaliError::YearOutOfRange(jy));
    }

    let gy = jy + 621;
    let mut leap_j = -14;
    let mut jp = BREAKS[0];
    let mut jump = 0;

    for &jm in &BREAKS[1..] {
        jump = jm - jp;
        if jy < jm {
            break;
        }
        leap_j += jump / 33 * 8 + jump % 33 / 4;
        jp = jm;
    }

    let mut n = jy - jp;
    leap_j += n / 33 * 8 + (n % 33 + 3) / 4;
    if jump % 33 == 4 && jump - n == 4 {
        leap_j += 1;
    }

    let leap_g = gy / 4 - (gy / 100 + 1) * 3 / 4 - 150;
    let march = 20 + leap_j - leap_g;

    if jump - n < 6 {
        n = n - jump + (jump + 4) / 33 * 33;
    }
    let mut leap = ((n + 1) % 33 - 1) % 4;
    if leap == -1 {
        leap = 4;
    }

    Ok(JalCal { leap, gy, march })
}

/// Julian day number of a Jalali date.
fn j2d(jy: i64, jm: i64, jd: i64) -> Result<i64, JalaliError> {
    let r = jal_cal(jy)?;
    Ok(g2d(r.gy, 3, r.march) + (jm - 1) * 31 - jm / 7 * (jm - 7) + jd - 1)
}

fn d2j(jdn: i64) -> Result<(i64, i64, i64), JalaliError> {
    let (gy, _, _) = d2g(jdn);
    let mut jy = gy - 621;
    let r = jal_cal(jy)?;
    let jdn1f = g2d(gy, 3, r.march);

    let mut k = jdn - jdn1f;
    if k >= 0 {
        if k <= 185 {
            return Ok((jy, 1 + k / 31, k % 31 + 1));
        }
        k -= 186;
    } else {
        jy -= 1;
        k += 179;
        if r.leap == 1 {
            k += 1;
        }
    }

    Ok((jy, 7 + k / 30, k % 30 + 1))
}

/// Julian day number of a Gregorian date.
fn g2d(gy: i64, gm: i64, gd: i64) -> i64 {
    let d = (gy + (gm - 8) / 6 + 100100) * 1461 / 4 + (153 * ((gm + 9) % 12) + 2) / 5 + gd
        - 34840408;
    d - (gy + 100100 + (gm - 8) / 6) / 100 * 3 / 4 + 752
}

fn d2g(jdn: i64) -> (i64, i64, i64) {
    let mut j = 4 * jdn + 139361631;
    j += (4 * jdn + 183187720) / 146097 * 3 / 4 * 4 - 3908;
    let i = j % 1461 / 4 * 5 + 308;
    let gd = i % 153 / 5 + 1;
    let gm = i / 153 % 12 + 1;
    let gy = j / 1461 - 100100 + (8 - gm) / 6;
    (gy, gm, gd)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn greg(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn known_jalali_to_gregorian_vectors() {
        assert_eq!(jalali_to_gregorian(1395, 1, 23).unwrap(), greg(2016, 4, 11));
        assert_eq!(jalali_to_gregorian(1403, 1, 1).unwrap(), greg(2024, 3, 20));
        assert_eq!(jalali_to_gregorian(1403, 5, 1).unwrap(), greg(2024, 7, 22));
        assert_eq!(jalali_to_gregorian(1402, 12, 29).unwrap(), greg(2024, 3, 19));
    }

    #[test]
    fn known_gregorian_to_jalali_vectors() {
        assert_eq!(gregorian_to_jalali(greg(2016, 4, 11)).unwrap(), (1395, 1, 23));
        assert_eq!(gregorian_to_jalali(greg(2024, 3, 20)).unwrap(), (1403, 1, 1));
        assert_eq!(gregorian_to_jalali(greg(2024, 7, 22)).unwrap(), (1403, 5, 1));
        assert_eq!(gregorian_to_jalali(greg(2024, 3, 19)).unwrap(), (1402, 12, 29));
    }

    #[test]
    fn round_trips_across_year_boundaries() {
        for date in [
            greg(2023, 3, 21),
            greg(2024, 3, 19),
            greg(2024, 3, 20),
            greg(2024, 12, 31),
            greg(2025, 1, 1),
            greg(2025, 9, 1),
        ] {
            let (jy, jm, jd) = gregorian_to_jalali(date).unwrap();
            assert_eq!(jalali_to_gregorian(jy, jm, jd).unwrap(), date, "{date}");
        }
    }

    #[test]
    fn esfand_length_follows_leap_years() {
        assert_eq!(month_length(1402, 12).unwrap(), 29);
        assert_eq!(month_length(1403, 12).unwrap(), 30);
        assert!(is_leap_year(1403).unwrap());
        assert!(!is_leap_year(1402).unwrap());
    }

    #[test]
    fn rejects_out_of_range_dates() {
        assert_eq!(
            jalali_to_gregorian(1403, 13, 1),
            Err(JalaliError::InvalidDate(1403, 13, 1))
        );
        assert_eq!(
            jalali_to_gregorian(1402, 12, 30),
            Err(JalaliError::InvalidDate(1402, 12, 30))
        );
        assert_eq!(
            jalali_to_gregorian(5000, 1, 1),
            Err(JalaliError::YearOutOfRange(5000))
        );
    }

    #[test]
    fn formats_provider_date_strings() {
        assert_eq!(format_jalali(greg(2024, 7, 22)).unwrap(), "1403/05/01");
        assert_eq!(format_jalali(greg(2024, 3, 20)).unwrap(), "1403/01/01");
    }
}
