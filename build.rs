use proc_macro2::TokenStream;
use quote::quote;
use std::env;
use std::fs;
use std::path::Path;

/// One closed-table entry: a message code's fixed-field widths and its
/// per-version allowed variable-field IDs (§4.2).
///
/// `v2_fields: None` means no 2.00 entry is declared, so the 1.00 entry is
/// inherited; `Some(_)` means the 2.00 entry recognizes additional fields
/// beyond what 1.00 does.
struct RawSchema {
    code: &'static str,
    name: &'static str,
    widths: &'static [usize],
    v1_fields: &'static [&'static str],
    v2_fields: Option<&'static [&'static str]>,
}

/// The closed SIP2 message catalogue (§6.3), copied from the protocol
/// specification and cross-checked against the field/message tables bundled
/// with this repository. Widths are version-invariant; only the
/// recognized-field sets grow from 1.00 to 2.00.
const SCHEMAS: &[RawSchema] = &[
    RawSchema { code: "01", name: "Block Patron", widths: &[1, 18], v1_fields: &["AO", "AL", "AA", "AC"], v2_fields: None },
    RawSchema { code: "09", name: "Checkin Request", widths: &[1, 18, 18], v1_fields: &["AP", "AO", "AB", "AC", "BI"], v2_fields: None },
    RawSchema { code: "10", name: "Checkin Response", widths: &[1, 1, 1, 1, 18], v1_fields: &["AO", "AB", "AQ", "AJ"], v2_fields: Some(&["AO", "AB", "AQ", "AJ", "CL", "AA", "CK", "CH"]) },
    RawSchema { code: "11", name: "Checkout Request", widths: &[1, 1, 18, 18], v1_fields: &["AO", "AA", "AB", "AC", "AD", "BO", "BI"], v2_fields: None },
    RawSchema { code: "12", name: "Checkout Response", widths: &[1, 1, 1, 1, 18], v1_fields: &["AO", "AA", "AB", "AJ", "AH"], v2_fields: Some(&["AO", "AA", "AB", "AJ", "AH", "CI", "CK", "CH", "BV", "BH", "BT", "BK", "BL", "CQ"]) },
    RawSchema { code: "15", name: "Hold Request", widths: &[1, 18], v1_fields: &["AO", "AA", "AD", "AB", "AJ", "BS", "BY"], v2_fields: None },
    RawSchema { code: "16", name: "Hold Response", widths: &[1, 1, 18], v1_fields: &["AA", "BW", "BR", "BS", "AB", "AJ", "AO", "AF", "AG"], v2_fields: None },
    RawSchema { code: "17", name: "Item Information Request", widths: &[18], v1_fields: &["AO", "AB"], v2_fields: None },
    RawSchema { code: "18", name: "Item Information Response", widths: &[2, 2, 2, 18], v1_fields: &["AB", "AJ", "AQ", "AP", "AF", "AG"], v2_fields: Some(&["AB", "AJ", "CK", "AQ", "AP", "CH", "BH", "BV", "BG", "CF", "AH", "CJ", "CM", "AF", "AG"]) },
    RawSchema { code: "19", name: "Item Status Update Request", widths: &[18], v1_fields: &["AO", "AB", "CH"], v2_fields: None },
    RawSchema { code: "20", name: "Item Status Update Response", widths: &[1, 18], v1_fields: &["AB", "AJ", "CH", "AF", "AG"], v2_fields: None },
    RawSchema { code: "23", name: "Patron Status Request", widths: &[3, 18], v1_fields: &["AO", "AA", "AC", "AD"], v2_fields: None },
    RawSchema { code: "24", name: "Patron Status Response", widths: &[14, 3, 18], v1_fields: &["AE", "AA", "AO", "AF", "AG"], v2_fields: Some(&["AE", "AA", "AO", "AF", "AG", "BL", "CQ", "BH", "BV"]) },
    RawSchema { code: "25", name: "Patron Enable Request", widths: &[18], v1_fields: &["AO", "AA", "AD"], v2_fields: None },
    RawSchema { code: "26", name: "Patron Enable Response", widths: &[14, 3, 18], v1_fields: &["AA", "AE", "CQ", "BL", "AF", "AG"], v2_fields: None },
    RawSchema { code: "29", name: "Renew Request", widths: &[1, 1, 18, 18], v1_fields: &["AO", "AA", "AD", "AB", "AJ", "CH", "BI"], v2_fields: None },
    RawSchema { code: "30", name: "Renew Response", widths: &[1, 1, 1, 1, 18], v1_fields: &["AA", "AB", "AJ", "AH", "AO", "AF", "AG"], v2_fields: Some(&["AA", "AB", "AJ", "AH", "CI", "CK", "CH", "BV", "BH", "BT", "BK", "AO", "AF", "AG"]) },
    RawSchema { code: "35", name: "End Patron Session", widths: &[18], v1_fields: &["AO", "AA", "AC"], v2_fields: None },
    RawSchema { code: "36", name: "End Session Response", widths: &[1, 18], v1_fields: &["AO", "AA", "AF", "AG"], v2_fields: None },
    RawSchema { code: "37", name: "Fee Paid", widths: &[18, 2, 2, 3], v1_fields: &["AO", "AA", "AC", "AD", "BK", "CG"], v2_fields: None },
    RawSchema { code: "38", name: "Fee Paid Response", widths: &[1, 18], v1_fields: &["AO", "AA", "BK", "AF", "AG"], v2_fields: None },
    RawSchema { code: "63", name: "Patron Information", widths: &[3, 18, 10], v1_fields: &["AO", "AA", "AC", "AD", "BP", "BQ"], v2_fields: None },
    RawSchema { code: "64", name: "Patron Information Response", widths: &[14, 3, 18, 4, 4, 4, 4, 4, 4], v1_fields: &["AA", "AE", "BD", "BE", "BF", "AS", "AT", "AU", "AV", "BU", "CD", "AO"], v2_fields: Some(&["AA", "AE", "BD", "BE", "BF", "AS", "AT", "AU", "AV", "BU", "CD", "BL", "CQ", "PB", "PC", "AO"]) },
    RawSchema { code: "65", name: "Renew All Request", widths: &[18], v1_fields: &["AO", "AA", "AC", "AD"], v2_fields: None },
    RawSchema { code: "66", name: "Renew All Response", widths: &[1, 4, 4, 18], v1_fields: &["AO", "BM", "BN", "AF", "AG"], v2_fields: None },
    RawSchema { code: "93", name: "Login Request", widths: &[1, 1], v1_fields: &["CN", "CO", "CP"], v2_fields: None },
    RawSchema { code: "94", name: "Login Response", widths: &[1], v1_fields: &[], v2_fields: None },
    RawSchema { code: "97", name: "Request ACS Resend", widths: &[], v1_fields: &[], v2_fields: None },
    RawSchema { code: "98", name: "ACS Status", widths: &[1, 1, 1, 1, 1, 1, 3, 3, 18, 4], v1_fields: &["AO", "AF", "AG"], v2_fields: Some(&["AO", "AF", "AG", "BX"]) },
    RawSchema { code: "99", name: "SC Status", widths: &[1, 3, 4], v1_fields: &[], v2_fields: None },
];

fn generate_schema_table() -> TokenStream {
    let entries = SCHEMAS.iter().map(|raw| {
        let code = raw.code;
        let name = raw.name;
        let widths = raw.widths;
        let v1_fields = raw.v1_fields;
        let v2_fields_tokens = match raw.v2_fields {
            Some(fields) => quote! { Some(&[#(#fields),*]) },
            None => quote! { None },
        };
        quote! {
            RawSchema {
                code: #code,
                name: #name,
                widths: &[#(#widths),*],
                v1_fields: &[#(#v1_fields),*],
                v2_fields: #v2_fields_tokens,
            }
        }
    });

    quote! {
        pub(crate) static RAW_SCHEMAS: &[RawSchema] = &[
            #(#entries),*
        ];
    }
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let out_dir = env::var("OUT_DIR").unwrap();
    let dest_path = Path::new(&out_dir).join("schema_table.rs");

    let generated = generate_schema_table();
    fs::write(&dest_path, generated.to_string()).unwrap();

    // Keep a development copy under src/ so the generated table is easy to
    // read without digging through OUT_DIR; schema.rs includes the OUT_DIR
    // copy, not this one.
    let src_dest = Path::new("src/schema/generated.rs");
    if let Some(parent) = src_dest.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let header = "// AUTO-GENERATED by build.rs. Do not edit by hand.\n";
    let final_content = format!("{}{}", header, generated);
    let _ = fs::write(src_dest, final_content);
}
