//! Network management logic: address claiming, current address tracking,
//! neighbour discovery, and NAME field manipulation.
pub mod address_claiming;
pub mod address_manager;
pub mod address_supervisor;
pub mod iso_name;
pub mod network_discovering;
