pub(crate) mod connect;
pub(crate) mod console;
pub(crate) mod palette;
pub(crate) mod tail;
