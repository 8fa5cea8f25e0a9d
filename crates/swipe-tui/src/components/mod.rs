pub mod carousel_view;
pub mod header;
pub mod overlay;
pub mod station_grid;
