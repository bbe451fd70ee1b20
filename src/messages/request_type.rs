// ABOUTME: Defines the fixed request-type tags shared with the native engine
// ABOUTME: Tag values identify command families on the wire and are never renumbered

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Request-type tag carried in every command request.
///
/// The transport core never interprets these beyond encoding the integer
/// value; the catalogue exists so the language surface and the native engine
/// agree on stable numbers. `CustomCommand` covers anything the enum does not
/// name, with the verb passed as the first argument.
#[derive(TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum RequestType {
    /// Unset tag; rejected by the native engine.
    #[default]
    InvalidRequest = 0,
    /// Escape hatch carrying the command verb as the first argument.
    CustomCommand = 1,

    // Connection-level commands
    Ping = 2,
    Info = 3,
    Select = 4,
    Echo = 5,
    ClientGetName = 6,
    ClientId = 7,

    // Server configuration
    ConfigGet = 8,
    ConfigSet = 9,
    ConfigResetStat = 10,
    ConfigRewrite = 11,

    // String commands
    Get = 12,
    Set = 13,
    MGet = 14,
    MSet = 15,
    Incr = 16,
    IncrBy = 17,
    IncrByFloat = 18,
    Decr = 19,
    DecrBy = 20,
    Append = 21,
    Strlen = 22,
    GetRange = 23,
    SetRange = 24,

    // Key-space commands
    Del = 25,
    Exists = 26,
    Expire = 27,
    ExpireAt = 28,
    PExpire = 29,
    PExpireAt = 30,
    Ttl = 31,
    PTtl = 32,
    Persist = 33,
    Type = 34,
    Unlink = 35,
    Rename = 36,

    // Hash commands
    HSet = 37,
    HGet = 38,
    HDel = 39,
    HExists = 40,
    HGetAll = 41,
    HMGet = 42,
    HIncrBy = 43,
    HIncrByFloat = 44,
    HLen = 45,
    HKeys = 46,
    HVals = 47,

    // List commands
    LPush = 48,
    LPop = 49,
    RPush = 50,
    RPop = 51,
    LLen = 52,
    LRange = 53,
    LRem = 54,
    LTrim = 55,
    LIndex = 56,

    // Set commands
    SAdd = 57,
    SRem = 58,
    SMembers = 59,
    SCard = 60,
    SIsMember = 61,

    // Sorted-set commands
    ZAdd = 62,
    ZRem = 63,
    ZRange = 64,
    ZCard = 65,
    ZScore = 66,

    // Scripting and multi-key primitives
    Sort = 67,
    Watch = 68,
    Unwatch = 69,
    FunctionLoad = 70,
    FunctionCall = 71,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_values_are_stable() {
        assert_eq!(u32::from(RequestType::InvalidRequest), 0);
        assert_eq!(u32::from(RequestType::CustomCommand), 1);
        assert_eq!(u32::from(RequestType::Get), 12);
        assert_eq!(u32::from(RequestType::FunctionCall), 71);
    }

    #[test]
    fn unknown_tag_rejected() {
        assert!(RequestType::try_from(9999u32).is_err());
    }
}
