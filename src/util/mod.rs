pub(crate) mod panic;
