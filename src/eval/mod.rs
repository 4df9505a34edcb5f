//! Model evaluation: the k-NN tester over learned embeddings.

pub mod knn;

pub use knn::KnnClassifier;
