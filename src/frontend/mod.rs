pub mod lang;
pub mod lexer;
pub mod stream;
pub mod token;
pub mod token_dumper;

pub use lexer::Lexer;
pub use stream::{TokenSource, TokenStream};
pub use token::{Token, TokenKind};
