mod knn;

pub use knn::KnnRegressor;
