//! Listing snapshots for representative templates

use stencil::{compile, CompileOptions};

fn listing(source: &str, options: &CompileOptions) -> String {
    compile(source, options)
        .expect("template to compile")
        .listing()
}

#[test]
fn test_plain_print_run() {
    insta::assert_snapshot!(listing("Hello {echo name}!", &CompileOptions::default()), @r#"
    <?php if(!defined('AWA_TEMPLATE_GUARD')){exit('Template guard restriction');}
    $___accum='';
    $___accum.='Hello '.($name).'!';
    return $___accum;
    "#);
}

#[test]
fn test_nested_blocks() {
    let source = "{for users k u}{if u.admin}<b>{echo u.name}</b>{else}{echo k}{endif}{else}nobody{endfor}";
    insta::assert_snapshot!(listing(source, &CompileOptions::default()), @r#"
    <?php if(!defined('AWA_TEMPLATE_GUARD')){exit('Template guard restriction');}
    $___accum='';
    $___tplUniqVar1=$users;
    if($___tplUniqVar1){
      foreach($___tplUniqVar1 as $k=>$u){
        if($u->admin){
          $___accum.='<b>'.($u->name).'</b>';
        }else{
          $___accum.=($k);
        }
      }
    }else{
      $___accum.='nobody';
    }
    return $___accum;
    "#);
}

#[test]
fn test_statements_and_calls() {
    let options = CompileOptions::default().with_output_function("upper");
    let source = "{set n 0}{inc n}{upper \"a\" n}{include \"footer\"}";
    insta::assert_snapshot!(listing(source, &options), @r#"
    <?php if(!defined('AWA_TEMPLATE_GUARD')){exit('Template guard restriction');}
    $___accum='';
    $n=0;
    $n++;
    $___accum.=$this->userFunctions['upper']('a', $n).$this->render('footer', get_defined_vars());
    return $___accum;
    "#);
}

#[test]
fn test_literal_quoting() {
    let source = r"{raw}it's C:\dir{endraw}";
    insta::assert_snapshot!(listing(source, &CompileOptions::default()), @r#"
    <?php if(!defined('AWA_TEMPLATE_GUARD')){exit('Template guard restriction');}
    $___accum='';
    $___accum.='it\'s C:\\dir';
    return $___accum;
    "#);
}

#[test]
fn test_temp_names_restart_per_compile() {
    let source = "{for a x}{else}{endfor}{for b y}{else}{endfor}";
    let first = listing(source, &CompileOptions::default());
    let second = listing(source, &CompileOptions::default());
    assert_eq!(first, second);
    assert!(first.contains("$___tplUniqVar1=$a;"));
    assert!(first.contains("$___tplUniqVar2=$b;"));
}
