//! External service clients

mod open_data_client;

pub use open_data_client::{
    is_transient_status, next_page_link, Listing, OpenDataClient, OpenDataError, PageLink,
};
