use cfgrammar::yacc::YaccKind;
use lrlex::{CTLexerBuilder, DefaultLexerTypes};

fn main() {
    // The LIR parser is only used by tests.
    CTLexerBuilder::<DefaultLexerTypes<u16>>::new_with_lexemet()
        .lrpar_config(|ctp| {
            ctp.yacckind(YaccKind::Grmtools)
                .grammar_in_src_dir("lir/lir.y")
                .unwrap()
        })
        .lexer_in_src_dir("lir/lir.l")
        .unwrap()
        .build()
        .unwrap();
}
