//! Split boundaries per language, strongest first

use crate::types::Language;

/// Paragraph, line, word, then grapheme
pub const GENERIC: &[&str] = &["\n\n", "\n", " ", ""];

/// Language-specific separators followed by the generic ones
pub fn separators_for(language: Option<Language>) -> Vec<&'static str> {
    let specific: &[&str] = match language {
        None => &[],
        Some(Language::Python) => &["\nclass ", "\ndef ", "\n\tdef ", "\n    def "],
        Some(Language::Go) => &[
            "\nfunc ", "\nvar ", "\nconst ", "\ntype ", "\nif ", "\nfor ", "\nswitch ", "\ncase ",
        ],
        Some(Language::Java) => &[
            "\nclass ", "\npublic ", "\nprotected ", "\nprivate ", "\nstatic ", "\nif ", "\nfor ",
            "\nwhile ", "\nswitch ", "\ncase ",
        ],
        Some(Language::Kotlin) => &[
            "\nclass ", "\npublic ", "\nprotected ", "\nprivate ", "\ninternal ", "\ncompanion ",
            "\nfun ", "\nval ", "\nvar ", "\nif ", "\nfor ", "\nwhile ", "\nwhen ", "\nelse ",
        ],
        Some(Language::Js) => &[
            "\nfunction ", "\nconst ", "\nlet ", "\nvar ", "\nclass ", "\nif ", "\nfor ",
            "\nwhile ", "\nswitch ", "\ncase ", "\ndefault ",
        ],
        Some(Language::Ts) => &[
            "\nenum ", "\ninterface ", "\nnamespace ", "\ntype ", "\nclass ", "\nfunction ",
            "\nconst ", "\nlet ", "\nvar ", "\nif ", "\nfor ", "\nwhile ", "\nswitch ", "\ncase ",
            "\ndefault ",
        ],
        Some(Language::Php) => &[
            "\nfunction ", "\nclass ", "\nif ", "\nforeach ", "\nwhile ", "\ndo ", "\nswitch ",
            "\ncase ",
        ],
        Some(Language::Proto) => &[
            "\nmessage ", "\nservice ", "\nenum ", "\noption ", "\nimport ", "\nsyntax ",
        ],
        Some(Language::Cpp) | Some(Language::C) => &[
            "\nclass ", "\nstruct ", "\nvoid ", "\nint ", "\nfloat ", "\ndouble ", "\nif ",
            "\nfor ", "\nwhile ", "\nswitch ", "\ncase ",
        ],
        Some(Language::Ruby) => &[
            "\ndef ", "\nclass ", "\nmodule ", "\nif ", "\nunless ", "\nwhile ", "\nfor ",
            "\ndo ", "\nbegin ", "\nrescue ",
        ],
        Some(Language::Rust) => &[
            "\nfn ", "\npub fn ", "\nimpl ", "\nstruct ", "\nenum ", "\ntrait ", "\nmod ",
            "\nconst ", "\nlet ", "\nif ", "\nwhile ", "\nfor ", "\nloop ", "\nmatch ",
        ],
        Some(Language::Scala) => &[
            "\nclass ", "\nobject ", "\ndef ", "\nval ", "\nvar ", "\nif ", "\nfor ", "\nwhile ",
            "\nmatch ", "\ncase ",
        ],
        Some(Language::Swift) => &[
            "\nfunc ", "\nclass ", "\nstruct ", "\nenum ", "\nif ", "\nfor ", "\nwhile ",
            "\ndo ", "\nswitch ", "\ncase ",
        ],
        Some(Language::Markdown) => &[
            "\n# ", "\n## ", "\n### ", "\n#### ", "\n##### ", "\n###### ", "```\n", "\n***\n",
            "\n---\n", "\n___\n",
        ],
        Some(Language::Latex) => &[
            "\n\\chapter{", "\n\\section{", "\n\\subsection{", "\n\\subsubsection{",
            "\n\\begin{enumerate}", "\n\\begin{itemize}", "\n\\begin{description}",
            "\n\\begin{list}", "\n\\begin{quote}", "\n\\begin{verbatim}", "\n\\begin{align}",
        ],
        Some(Language::Sol) => &[
            "\npragma ", "\nusing ", "\ncontract ", "\ninterface ", "\nlibrary ",
            "\nconstructor ", "\ntype ", "\nfunction ", "\nevent ", "\nmodifier ", "\nerror ",
            "\nstruct ", "\nenum ", "\nif ", "\nfor ", "\nwhile ", "\ndo while ", "\nassembly ",
        ],
        Some(Language::CSharp) => &[
            "\ninterface ", "\nenum ", "\nimplements ", "\ndelegate ", "\nevent ", "\nclass ",
            "\nabstract ", "\npublic ", "\nprotected ", "\nprivate ", "\nstatic ", "\nreturn ",
            "\nif ", "\ncontinue ", "\nfor ", "\nforeach ", "\nwhile ", "\nswitch ", "\nbreak ",
            "\ncase ", "\nelse ", "\ntry ", "\nthrow ", "\nfinally ", "\ncatch ",
        ],
        Some(Language::Cobol) => &[
            "\nIDENTIFICATION DIVISION.", "\nENVIRONMENT DIVISION.", "\nDATA DIVISION.",
            "\nPROCEDURE DIVISION.", "\nWORKING-STORAGE SECTION.", "\nLINKAGE SECTION.",
            "\nFILE SECTION.", "\nINPUT-OUTPUT SECTION.", "\nOPEN ", "\nCLOSE ", "\nREAD ",
            "\nWRITE ", "\nIF ", "\nELSE ", "\nMOVE ", "\nPERFORM ", "\nUNTIL ", "\nVARYING ",
            "\nACCEPT ", "\nDISPLAY ", "\nSTOP RUN.",
        ],
        Some(Language::Lua) => &[
            "\nlocal ", "\nfunction ", "\nif ", "\nfor ", "\nwhile ", "\nrepeat ",
        ],
        Some(Language::Perl) => &[
            "\npackage ", "\nsub ", "\nuse ", "\nmy ", "\nif ", "\nunless ", "\nforeach ",
            "\nwhile ",
        ],
        Some(Language::Haskell) => &[
            "\nmain :: ", "\nmain = ", "\nmodule ", "\nimport ", "\ndata ", "\nnewtype ",
            "\ntype ", "\nclass ", "\ninstance ", "\nlet ", "\nin ", "\ndo ", "\nwhere ",
            "\ncase ",
        ],
        Some(Language::Elixir) => &[
            "\ndefmodule ", "\ndefprotocol ", "\ndefmacro ", "\ndefmacrop ", "\ndef ", "\ndefp ",
            "\nif ", "\nunless ", "\nwhile ", "\ncase ", "\ncond ", "\nwith ", "\nfor ", "\ndo ",
        ],
        Some(Language::PowerShell) => &[
            "\nfunction ", "\nparam ", "\nclass ", "\nif ", "\nforeach ", "\nfor ", "\nwhile ",
            "\nswitch ", "\ntry ", "\ncatch ", "\nfinally ",
        ],
        Some(Language::Rst) => &["\n===", "\n---", "\n***", "\n.. "],
    };

    specific.iter().chain(GENERIC).copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generic_fallback_is_last() {
        for language in [None, Some(Language::Python), Some(Language::Markdown)] {
            let seps = separators_for(language);
            assert_eq!(&seps[seps.len() - GENERIC.len()..], GENERIC);
            assert_eq!(seps.last(), Some(&""));
        }
    }

    #[test]
    fn test_code_boundaries_come_first() {
        assert_eq!(separators_for(Some(Language::Rust))[0], "\nfn ");
        assert_eq!(separators_for(Some(Language::Python))[0], "\nclass ");
        assert_eq!(separators_for(None), GENERIC.to_vec());
    }
}
