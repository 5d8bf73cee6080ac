pub mod exclusive_round_trip;
pub mod lock_order_inversion;
pub mod shared_readers;
