pub mod user {
    pub mod schema;
    pub mod model;
    pub mod repository;
    pub mod repository_http;
    pub mod service;
}

pub mod friend {
    pub mod schema;
    pub mod model;
    pub mod repository;
    pub mod repository_http;
    pub mod service;
}

pub mod startup {
    pub mod schema;
    pub mod model;
    pub mod repository;
    pub mod repository_http;
    pub mod service;
}

pub mod investment {
    pub mod schema;
    pub mod model;
    pub mod repository;
    pub mod repository_http;
    pub mod service;
}
