pub mod late_fee_controller;
