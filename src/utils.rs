pub mod db_utils;
pub mod qr_code_filter;
pub mod student_cache;
