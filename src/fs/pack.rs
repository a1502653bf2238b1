//! Packing of the 3 byte OASIS timestamp.
//!
//! Bits, most significant first: month (4), day (5), year (4), hour (5), minute (6).
//! The year counts from 1977, so the representable range ends in 1992.
//! Seconds are not stored.

use chrono::{Datelike,Timelike};

pub const BASE_YEAR: u16 = 1977;

/// Timestamp fields after unpacking, `year` is the offset from 1977
#[derive(Debug,Clone,Copy,PartialEq,Eq,Default)]
pub struct Timestamp {
    pub month: u8,
    pub day: u8,
    pub year: u8,
    pub hour: u8,
    pub minute: u8
}

impl Timestamp {
    /// Clamp every field into its valid range
    pub fn clamped(&self) -> Self {
        Self {
            month: self.month.clamp(1,12),
            day: self.day.clamp(1,31),
            year: self.year.min(15),
            hour: self.hour.min(23),
            minute: self.minute.min(59)
        }
    }
    pub fn full_year(&self) -> u16 {
        BASE_YEAR + self.year as u16
    }
    /// Convert to `chrono`, None if the day does not exist in that month
    pub fn to_naive(&self) -> Option<chrono::NaiveDateTime> {
        match chrono::NaiveDate::from_ymd_opt(self.full_year() as i32,self.month as u32,self.day as u32) {
            Some(date) => date.and_hms_opt(self.hour as u32,self.minute as u32,0),
            None => None
        }
    }
    /// Convert from `chrono`, dates outside 1977-1992 are clamped
    pub fn from_naive(time: &chrono::NaiveDateTime) -> Self {
        let year = (time.year() - BASE_YEAR as i32).clamp(0,15) as u8;
        Self {
            month: time.month() as u8,
            day: time.day() as u8,
            year,
            hour: time.hour() as u8,
            minute: time.minute() as u8
        }.clamped()
    }
}

pub fn pack_time(ts: &Timestamp) -> [u8;3] {
    let t = ts.clamped();
    [
        (t.month << 4) | (t.day >> 1),
        ((t.day & 1) << 7) | (t.year << 3) | (t.hour >> 2),
        ((t.hour & 3) << 6) | t.minute
    ]
}

pub fn unpack_time(raw: [u8;3]) -> Timestamp {
    Timestamp {
        month: raw[0] >> 4,
        day: ((raw[0] & 0x0f) << 1) | (raw[1] >> 7),
        year: (raw[1] >> 3) & 0x0f,
        hour: ((raw[1] & 0x07) << 2) | (raw[2] >> 6),
        minute: raw[2] & 0x3f
    }.clamped()
}

/// Pack the given time, or the current local time if None
pub fn pack_naive(time: Option<chrono::NaiveDateTime>) -> [u8;3] {
    let now = match time {
        Some(t) => t,
        _ => chrono::Local::now().naive_local()
    };
    pack_time(&Timestamp::from_naive(&now))
}
