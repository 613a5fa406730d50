pub mod length;
pub mod lowercase;
pub mod stemmer;
pub mod stopword;
