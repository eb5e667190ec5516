// Core modules implementing validation, formula construction, reshaping, and errors.
pub mod email;
pub mod error;
pub mod formula;
pub mod record;
