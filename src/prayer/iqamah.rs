use crate::prayer::model::{IqamahSetting, WallClockTime};
use crate::prayer::time_math::add_minutes;

/// Resolves an Iqamah rule against an Azan time. `None` means unresolved:
/// an offset rule with no Azan to count from.
pub fn resolve(setting: IqamahSetting, azan: Option<WallClockTime>) -> Option<WallClockTime> {
    match setting {
        IqamahSetting::Fixed(time) => Some(time),
        IqamahSetting::Offset(minutes) => add_minutes(azan, i64::from(minutes)),
    }
}
