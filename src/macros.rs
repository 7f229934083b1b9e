macro_rules! corrupt_header {
    ($e:expr) => {
        return Err($crate::Error::CorruptHeader(($e).to_string()))
    };
    ($fmt:expr, $($arg:tt)+) => {
        return Err($crate::Error::CorruptHeader(format!($fmt, $($arg)+)))
    };
}

macro_rules! corrupt_data {
    ($e:expr) => {
        return Err($crate::Error::CorruptData(($e).to_string()))
    };
    ($fmt:expr, $($arg:tt)+) => {
        return Err($crate::Error::CorruptData(format!($fmt, $($arg)+)))
    };
}

macro_rules! unsupported_layout {
    ($fmt:expr, $($arg:tt)+) => {
        return Err($crate::Error::UnsupportedLayout(format!($fmt, $($arg)+)))
    };
}
