pub mod npm_install;
