pub mod object;
pub mod value;

pub use object::{Block, ClassObj, ErrorKind, ErrorObj, Instance, Method, MethodBody};
pub use value::{pointer, Pointer, Value};
