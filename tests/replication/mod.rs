mod contention_case1;
mod convergence_case1;
