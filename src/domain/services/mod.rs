mod load_balancer;

pub use load_balancer::{LoadBalancer, RandomBalancer, RoundRobinBalancer};
